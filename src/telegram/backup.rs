//! Export-to-chat backup pipeline.
//!
//! The pipeline follows a fixed sequence, reporting through one status
//! message that is edited as it goes:
//! 1. Parse the export and count memories
//! 2. Download all media into a temporary directory
//! 3. Upload each file to the chat, one at a time, through the rate limiter
//! 4. Send a summary
//!
//! The temporary directory is removed when the pipeline returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use teloxide::RequestError;
use teloxide::payloads::{SendDocumentSetters, SendMessageSetters, SendPhotoSetters, SendVideoSetters};
use teloxide::prelude::*;
use teloxide::types::{InputFile, Message, ParseMode};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::RateLimiter;
use crate::config::BotConfig;
use crate::memories::{
    DownloadError, DownloadedMemory, ExportParser, MediaKind, MemoryDownloader, ParseError,
};

/// Largest file a bot may upload.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Largest image Telegram accepts through `sendPhoto`; bigger ones go as documents.
pub const MAX_PHOTO_BYTES: u64 = 10 * 1024 * 1024;

/// Errors raised while handling updates.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Failed to fetch the export from Telegram: {0}")]
    FileDownload(#[from] teloxide::DownloadError),

    #[error("Failed to download memory: {0}")]
    Download(#[from] DownloadError),

    #[error("Failed to set up the export parser: {0}")]
    Parser(#[from] ParseError),

    #[error("File is too large to upload ({size} bytes, limit {MAX_UPLOAD_BYTES})")]
    TooLarge { size: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters for the final summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackupReport {
    /// Memories listed in the export.
    pub total: usize,

    /// Memories downloaded successfully.
    pub downloaded: usize,

    /// Memories posted to the chat.
    pub uploaded: usize,
}

impl BackupReport {
    /// Summary message in HTML.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "🎉 <b>Backup Complete!</b>\n\n\
             ✅ Successfully uploaded: {}/{}\n\
             📊 Total processed: {}\n\
             ⏰ All memories are now safely stored in this chat!\n\n\
             💡 <b>Tip:</b> You can search for specific dates using Telegram's search feature.",
            self.uploaded, self.total, self.downloaded
        )
    }
}

/// Shared state of the bot: parser, downloader and upload pacing.
///
/// Uploads are paced per chat, so a flood wait in one chat leaves the
/// others alone.
#[derive(Debug)]
pub struct MemoryBackup {
    parser: ExportParser,
    downloader: MemoryDownloader,
    upload_interval: Duration,
    rate_limiters: Mutex<HashMap<ChatId, Arc<RateLimiter>>>,
}

impl MemoryBackup {
    /// Creates the pipeline from runtime settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the parser or HTTP client cannot be built.
    pub fn new(config: &BotConfig) -> Result<Arc<Self>, BotError> {
        Ok(Arc::new(Self {
            parser: ExportParser::new()?,
            downloader: MemoryDownloader::new(config.download_concurrency)?,
            upload_interval: config.upload_interval,
            rate_limiters: Mutex::new(HashMap::new()),
        }))
    }

    /// Returns the upload limiter of `chat_id`, creating it on first use.
    async fn rate_limiter(&self, chat_id: ChatId) -> Arc<RateLimiter> {
        let mut limiters = self.rate_limiters.lock().await;
        Arc::clone(
            limiters
                .entry(chat_id)
                .or_insert_with(|| Arc::new(RateLimiter::new(self.upload_interval))),
        )
    }

    /// Processes an export and reports progress in `chat_id`.
    ///
    /// Failures after the status message is sent are reported in the chat
    /// and not returned.
    pub async fn process_export(&self, bot: &Bot, chat_id: ChatId, html: &str) -> Result<(), BotError> {
        let status = bot
            .send_message(chat_id, "🔍 Processing your Snapchat data file...")
            .await?;

        match self.run(bot, chat_id, &status, html).await {
            Ok(Some(report)) => {
                info!(
                    "Backup finished for chat {}: {}/{} uploaded",
                    chat_id.0, report.uploaded, report.total
                );
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                error!("Error processing file: {}", e);
                bot.edit_message_text(chat_id, status.id, format!("❌ Error processing file: {e}"))
                    .await?;
                Ok(())
            }
        }
    }

    async fn run(
        &self,
        bot: &Bot,
        chat_id: ChatId,
        status: &Message,
        html: &str,
    ) -> Result<Option<BackupReport>, BotError> {
        let memories = self.parser.parse(html);

        if memories.is_empty() {
            bot.edit_message_text(
                chat_id,
                status.id,
                "❌ No memories found in the HTML file. Please make sure it's a valid Snapchat data export.",
            )
            .await?;
            return Ok(None);
        }

        bot.edit_message_text(
            chat_id,
            status.id,
            format!("📦 Found {} memories! Starting download...", memories.len()),
        )
        .await?;

        let temp_dir = tempfile::tempdir()?;
        let downloaded = self.downloader.download_all(&memories, temp_dir.path()).await;

        bot.edit_message_text(
            chat_id,
            status.id,
            format!(
                "✅ Downloaded {}/{} files. Now uploading to Telegram...",
                downloaded.len(),
                memories.len()
            ),
        )
        .await?;

        let mut report = BackupReport {
            total: memories.len(),
            downloaded: downloaded.len(),
            uploaded: 0,
        };

        for (i, item) in downloaded.iter().enumerate() {
            let progress = bot
                .send_message(
                    chat_id,
                    format!("📤 Uploading {}/{}...", i + 1, downloaded.len()),
                )
                .await?;

            match self.upload(bot, chat_id, item).await {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                    error!("Error uploading {} to Telegram: {}", item.memory.date, e);
                    bot.send_message(
                        chat_id,
                        format!("❌ Failed to upload {}: {e}", item.memory.date),
                    )
                    .await?;
                }
            }

            if let Err(e) = bot.delete_message(chat_id, progress.id).await {
                debug!("Could not delete progress message: {}", e);
            }
        }

        bot.send_message(chat_id, report.summary())
            .parse_mode(ParseMode::Html)
            .await?;

        Ok(Some(report))
    }

    /// Uploads one memory, retrying once after a flood wait.
    async fn upload(&self, bot: &Bot, chat_id: ChatId, item: &DownloadedMemory) -> Result<(), BotError> {
        if item.size > MAX_UPLOAD_BYTES {
            return Err(BotError::TooLarge { size: item.size });
        }

        let limiter = self.rate_limiter(chat_id).await;
        limiter.wait_and_acquire().await;
        match send_media(bot, chat_id, item).await {
            Err(RequestError::RetryAfter(after)) => {
                limiter.handle_flood_wait(after.duration()).await;
                limiter.wait_and_acquire().await;
                send_media(bot, chat_id, item).await.map_err(BotError::from)
            }
            other => other.map_err(BotError::from),
        }
    }
}

async fn send_media(bot: &Bot, chat_id: ChatId, item: &DownloadedMemory) -> Result<(), RequestError> {
    let caption = item.memory.caption();
    let file = InputFile::file(item.path.clone());

    match item.memory.kind() {
        MediaKind::Video => {
            bot.send_video(chat_id, file)
                .caption(caption)
                .supports_streaming(true)
                .await?;
        }
        MediaKind::Image if item.size > MAX_PHOTO_BYTES => {
            warn!(
                "Image {} is {} bytes, sending as document",
                item.path.display(),
                item.size
            );
            bot.send_document(chat_id, file).caption(caption).await?;
        }
        MediaKind::Image => {
            bot.send_photo(chat_id, file).caption(caption).await?;
        }
    }

    Ok(())
}
