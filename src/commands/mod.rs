//! Command handling module.
//!
//! Parses the slash commands users send to the bot and provides their
//! reply texts.

mod types;

pub use types::{BotCommand, SEND_FILE_HINT};
