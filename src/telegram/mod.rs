//! Telegram bot module.
//!
//! Routes updates to handlers, runs the export backup pipeline and paces
//! uploads to stay clear of Telegram's flood limits.

mod backup;
#[cfg(test)]
mod fake_api;
mod handlers;
mod rate_limiter;
mod runner;

pub use backup::{BackupReport, BotError, MAX_PHOTO_BYTES, MAX_UPLOAD_BYTES, MemoryBackup};
pub use handlers::{NOT_HTML_REPLY, schema};
pub use rate_limiter::RateLimiter;
pub use runner::run;
