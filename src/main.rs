//! Snapchat Memories Bot - Main Entry Point
//!
//! A Telegram bot that takes a Snapchat data export page, downloads every
//! memory it links to and posts them back into the chat.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use snapchat_memories_bot::config::{BotConfig, RunMode};
use snapchat_memories_bot::telegram;

/// Telegram bot that backs up Snapchat Memories.
#[derive(Parser, Debug)]
#[command(name = "memories_bot")]
#[command(about = "Back up Snapchat Memories exports into a Telegram chat")]
#[command(version)]
struct Args {
    /// Update delivery mode; overrides RUN_MODE.
    #[arg(short, long)]
    mode: Option<RunMode>,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let mut config = BotConfig::from_env().context(
        "Failed to load configuration from environment (get a token from @BotFather and set TELEGRAM_BOT_TOKEN)",
    )?;

    if let Some(mode) = args.mode {
        config = config
            .with_run_mode(mode)
            .context("Invalid run mode override")?;
    }

    info!(
        "Configuration loaded (mode: {}, port: {}, download concurrency: {}, upload interval: {:?})",
        config.run_mode, config.port, config.download_concurrency, config.upload_interval
    );

    telegram::run(config).await.context("Bot stopped with an error")?;

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
