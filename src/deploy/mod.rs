//! Deployment descriptor module.
//!
//! Describes how the bot container is built and started, renders the
//! matching Dockerfile, and scans built images for leaked secrets.

mod descriptor;
mod scan;

pub use descriptor::{DeploymentConfig, EntryPoint, EnvVar, looks_like_bot_token};
pub use scan::{Finding, MIN_SECRET_LEN, ScanError, scan_archive, scan_archive_file, scan_file};

/// Errors raised by descriptor handling.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Secret '{0}' has a literal value; secrets must be injected at runtime")]
    SecretLiteral(String),

    #[error("Invalid deployment descriptor: {0}")]
    Invalid(String),

    #[error("Failed to read descriptor file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse descriptor file: {0}")]
    Parse(#[from] serde_json::Error),
}
