//! Bot runner: wires the dispatcher to polling or to the webhook server.

use std::net::SocketAddr;

use teloxide::prelude::*;
use teloxide::types::BotCommand as MenuCommand;
use teloxide::update_listeners::webhooks;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::backup::{BotError, MemoryBackup};
use super::handlers::schema;
use crate::commands::BotCommand;
use crate::config::{BotConfig, RunMode};
use crate::health;

/// Runs the bot until Ctrl+C.
///
/// Both modes serve the health routes on the configured port; in webhook
/// mode the same server also receives updates.
///
/// # Errors
///
/// Returns an error if the webhook cannot be registered or the port
/// cannot be bound.
pub async fn run(config: BotConfig) -> Result<(), BotError> {
    let bot = Bot::new(config.token.expose());
    let backup = MemoryBackup::new(&config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    register_commands(&bot).await;

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![backup])
        .enable_ctrlc_handler()
        .build();

    info!("Starting memories bot in {} mode", config.run_mode);

    match config.run_mode {
        RunMode::Polling => {
            let health_server = tokio::spawn(serve_health(addr));

            info!("Bot is running. Use Ctrl+C to stop.");
            dispatcher.dispatch().await;

            health_server.abort();
        }
        RunMode::Webhook => {
            let Some(url) = config.webhook_endpoint() else {
                return Err(BotError::Io(std::io::Error::other(
                    "webhook mode without a webhook URL",
                )));
            };

            let mut options = webhooks::Options::new(addr, url.clone());
            if let Some(secret) = &config.webhook_secret {
                options = options.secret_token(secret.clone());
            }

            let (listener, stop_flag, webhook_router) =
                webhooks::axum_to_router(bot.clone(), options).await?;
            let router = webhook_router.merge(health::router());

            let tcp = TcpListener::bind(addr).await?;
            info!("Listening on {} (webhook {})", addr, url);

            let server = tokio::spawn(async move {
                if let Err(e) = axum::serve(tcp, router)
                    .with_graceful_shutdown(stop_flag)
                    .await
                {
                    error!("HTTP server error: {}", e);
                }
            });

            info!("Bot is running. Use Ctrl+C to stop.");
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await;

            if let Err(e) = server.await {
                warn!("HTTP server task ended abnormally: {}", e);
            }
        }
    }

    info!("Shutting down...");
    Ok(())
}

/// Serves the health routes alone (polling mode).
async fn serve_health(addr: SocketAddr) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Health endpoint disabled, cannot bind {}: {}", addr, e);
            return;
        }
    };

    info!("Health endpoint listening on {}", addr);
    if let Err(e) = axum::serve(listener, health::router()).await {
        error!("Health server error: {}", e);
    }
}

/// Publishes the command menu. Failure only costs the menu.
async fn register_commands(bot: &Bot) {
    let commands = BotCommand::all()
        .into_iter()
        .map(|c| MenuCommand::new(c.name(), c.description()));

    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("Failed to register command menu: {}", e);
    }
}
