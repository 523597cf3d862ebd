//! Configuration module for the memories bot.
//!
//! Runtime settings come from the environment (optionally seeded from a
//! `.env` file). The token is only ever read here and never logged.

mod settings;

pub use settings::{BotConfig, BotToken, ConfigError, RunMode, TOKEN_ENV_VAR};

/// Path Telegram posts webhook updates to.
pub const WEBHOOK_PATH: &str = "/webhook";

/// Path of the liveness endpoint.
pub const HEALTH_PATH: &str = "/health";
