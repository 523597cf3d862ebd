//! Update routing and message handlers.

use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::net::Download;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{Document, Me, ParseMode};
use tracing::{debug, info};

use super::backup::{BotError, MemoryBackup};
use crate::commands::{BotCommand, SEND_FILE_HINT};

/// Reply to documents that are not HTML files.
pub const NOT_HTML_REPLY: &str = "❌ Please send an HTML file from Snapchat data export.";

/// Builds the update routing tree.
///
/// Commands first, then documents, then plain text. Commands addressed to
/// other bots or unknown to this one are left unanswered.
pub fn schema() -> UpdateHandler<BotError> {
    Update::filter_message()
        .branch(dptree::filter_map(parse_command).endpoint(handle_command))
        .branch(
            dptree::filter_map(|msg: Message| msg.document().cloned()).endpoint(handle_document),
        )
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some_and(is_plain_text))
                .endpoint(handle_text),
        )
}

fn parse_command(msg: Message, me: Me) -> Option<BotCommand> {
    BotCommand::parse(msg.text()?, me.user.username.as_deref())
}

async fn handle_command(bot: Bot, msg: Message, command: BotCommand) -> Result<(), BotError> {
    debug!("Handling command {} in chat {}", command, msg.chat.id.0);

    bot.send_message(msg.chat.id, command.reply())
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn handle_document(
    bot: Bot,
    msg: Message,
    document: Document,
    backup: Arc<MemoryBackup>,
) -> Result<(), BotError> {
    if !is_html_file(document.file_name.as_deref()) {
        bot.send_message(msg.chat.id, NOT_HTML_REPLY).await?;
        return Ok(());
    }

    info!(
        "Received export {:?} ({} bytes) in chat {}",
        document.file_name, document.file.size, msg.chat.id.0
    );

    let file = bot.get_file(document.file.id.clone()).await?;
    let mut content = Vec::new();
    bot.download_file(&file.path, &mut content).await?;

    let html = String::from_utf8_lossy(&content);
    backup.process_export(&bot, msg.chat.id, &html).await
}

async fn handle_text(bot: Bot, msg: Message) -> Result<(), BotError> {
    bot.send_message(msg.chat.id, SEND_FILE_HINT).await?;
    Ok(())
}

fn is_plain_text(text: &str) -> bool {
    !text.starts_with('/')
}

/// Returns true for file names ending in `.html`, any case.
fn is_html_file(file_name: Option<&str>) -> bool {
    file_name.is_some_and(|name| name.to_lowercase().ends_with(".html"))
}
