//! Runtime settings loaded from the process environment.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Name of the environment variable holding the bot token.
pub const TOKEN_ENV_VAR: &str = "TELEGRAM_BOT_TOKEN";

/// Bot token, redacted in `Debug` output so it never ends up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    /// Wraps a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for API calls.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BotToken(***)")
    }
}

/// How the bot receives updates from Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Long polling (`getUpdates`).
    #[default]
    Polling,

    /// Webhook served by the built-in HTTP server.
    Webhook,
}

impl std::str::FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "polling" | "poll" => Ok(Self::Polling),
            "webhook" | "server" => Ok(Self::Webhook),
            _ => Err(ConfigError::InvalidValue {
                var: "RUN_MODE",
                value: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polling => f.write_str("polling"),
            Self::Webhook => f.write_str("webhook"),
        }
    }
}

/// Bot runtime configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token.
    pub token: BotToken,

    /// Update delivery mode.
    pub run_mode: RunMode,

    /// Port of the HTTP server (health routes and webhook).
    pub port: u16,

    /// Public base URL Telegram posts webhook updates to.
    pub webhook_url: Option<Url>,

    /// Secret Telegram echoes in `X-Telegram-Bot-Api-Secret-Token`.
    pub webhook_secret: Option<String>,

    /// Number of memories downloaded in parallel.
    pub download_concurrency: usize,

    /// Minimum delay between two uploads to the chat.
    pub upload_interval: Duration,
}

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 8;
const DEFAULT_UPLOAD_INTERVAL_MS: u64 = 1000;

impl BotConfig {
    /// Creates a polling configuration with defaults.
    #[must_use]
    pub fn new(token: BotToken) -> Self {
        Self {
            token,
            run_mode: RunMode::default(),
            port: DEFAULT_PORT,
            webhook_url: None,
            webhook_secret: None,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            upload_interval: Duration::from_millis(DEFAULT_UPLOAD_INTERVAL_MS),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `TELEGRAM_BOT_TOKEN` to be set. Everything else has a default.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(TOKEN_ENV_VAR)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar(TOKEN_ENV_VAR))?;

        let run_mode: RunMode = lookup("RUN_MODE")
            .map(|m| m.parse())
            .transpose()?
            .unwrap_or_default();

        let port = parse_var(&lookup, "PORT")?.unwrap_or(DEFAULT_PORT);

        let download_concurrency: usize =
            parse_var(&lookup, "DOWNLOAD_CONCURRENCY")?.unwrap_or(DEFAULT_DOWNLOAD_CONCURRENCY);
        if download_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                var: "DOWNLOAD_CONCURRENCY",
                value: "0".to_owned(),
            });
        }

        let upload_interval_ms =
            parse_var(&lookup, "UPLOAD_INTERVAL_MS")?.unwrap_or(DEFAULT_UPLOAD_INTERVAL_MS);

        // Render exposes the service URL as RENDER_EXTERNAL_URL.
        let raw_url = lookup("WEBHOOK_URL").or_else(|| {
            lookup("RENDER")
                .is_some()
                .then(|| lookup("RENDER_EXTERNAL_URL"))
                .flatten()
        });
        let webhook_url = raw_url
            .map(|u| {
                Url::parse(&u).map_err(|_| ConfigError::InvalidValue {
                    var: "WEBHOOK_URL",
                    value: u,
                })
            })
            .transpose()?;

        if run_mode == RunMode::Webhook && webhook_url.is_none() {
            return Err(ConfigError::MissingWebhookUrl);
        }

        let webhook_secret = lookup("WEBHOOK_SECRET").filter(|s| !s.is_empty());
        if let Some(secret) = &webhook_secret
            && !is_valid_webhook_secret(secret)
        {
            return Err(ConfigError::InvalidValue {
                var: "WEBHOOK_SECRET",
                value: "<redacted>".to_owned(),
            });
        }

        Ok(Self {
            token: BotToken::new(token.trim()),
            run_mode,
            port,
            webhook_url,
            webhook_secret,
            download_concurrency,
            upload_interval: Duration::from_millis(upload_interval_ms),
        })
    }

    /// Switches the run mode, e.g. from a command line override.
    ///
    /// # Errors
    ///
    /// Returns an error when switching to webhook mode without a URL.
    pub fn with_run_mode(mut self, run_mode: RunMode) -> Result<Self, ConfigError> {
        if run_mode == RunMode::Webhook && self.webhook_url.is_none() {
            return Err(ConfigError::MissingWebhookUrl);
        }
        self.run_mode = run_mode;
        Ok(self)
    }

    /// Full URL Telegram should deliver updates to.
    #[must_use]
    pub fn webhook_endpoint(&self) -> Option<Url> {
        let base = self.webhook_url.as_ref()?;
        base.join(super::WEBHOOK_PATH.trim_start_matches('/')).ok()
    }
}

/// Telegram accepts 1-256 characters from `A-Z`, `a-z`, `0-9`, `_` and `-`.
fn is_valid_webhook_secret(secret: &str) -> bool {
    (1..=256).contains(&secret.len())
        && secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var, value })
        })
        .transpose()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("Webhook mode requires WEBHOOK_URL (or RENDER_EXTERNAL_URL on Render)")]
    MissingWebhookUrl,
}
