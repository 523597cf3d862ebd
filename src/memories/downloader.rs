//! Memory media downloader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use super::Memory;

/// Header Snapchat expects on direct GET downloads.
const ROUTE_TAG_HEADER: &str = "X-Snap-Route-Tag";
const ROUTE_TAG_VALUE: &str = "mem-dmd";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur while downloading a memory.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("Failed to write file: {0}")]
    Io(#[from] std::io::Error),
}

/// A memory whose media is stored on disk.
#[derive(Debug, Clone)]
pub struct DownloadedMemory {
    /// The memory the file belongs to.
    pub memory: Memory,

    /// Location of the downloaded file.
    pub path: PathBuf,

    /// File size in bytes.
    pub size: u64,
}

/// Downloads memories over HTTP with bounded parallelism.
#[derive(Debug, Clone)]
pub struct MemoryDownloader {
    client: Client,
    concurrency: usize,
}

impl MemoryDownloader {
    /// Creates a downloader running at most `concurrency` requests at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(concurrency: usize) -> Result<Self, DownloadError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, concurrency))
    }

    /// Creates a downloader around an existing client.
    #[must_use]
    pub fn with_client(client: Client, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Downloads a single memory to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, any status other than 200,
    /// or if the file cannot be written.
    pub async fn download(
        &self,
        memory: &Memory,
        path: &Path,
    ) -> Result<DownloadedMemory, DownloadError> {
        let mut request = self.client.get(&memory.download_url);
        if memory.is_get_request {
            request = request.header(ROUTE_TAG_HEADER, ROUTE_TAG_VALUE);
        }

        let mut response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(DownloadError::Status {
                status: response.status(),
                url: memory.download_url.clone(),
            });
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut size = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {} ({} bytes)", path.display(), size);

        Ok(DownloadedMemory {
            memory: memory.clone(),
            path: path.to_path_buf(),
            size,
        })
    }

    /// Downloads every memory into `dir`.
    ///
    /// Results keep the order of `memories`. Failed downloads are logged and
    /// left out.
    pub async fn download_all(&self, memories: &[Memory], dir: &Path) -> Vec<DownloadedMemory> {
        let names = assign_file_names(memories);

        // Owned items keep the stream future `Send` for any caller lifetime.
        let downloaded: Vec<DownloadedMemory> =
            futures::stream::iter(memories.iter().cloned().zip(names))
                .map(|(memory, name)| {
                    let path = dir.join(name);
                    async move {
                        match self.download(&memory, &path).await {
                            Ok(downloaded) => Some(downloaded),
                            Err(e) => {
                                error!("Error downloading memory from {}: {}", memory.date, e);
                                None
                            }
                        }
                    }
                })
                .buffered(self.concurrency)
                .filter_map(|result| async move { result })
                .collect()
                .await;

        info!(
            "Downloaded {}/{} memories",
            downloaded.len(),
            memories.len()
        );
        downloaded
    }
}

/// Assigns a unique file name to each memory.
///
/// Memories captured in the same second share a base name; later ones get
/// a `_2`, `_3`, ... suffix before the extension.
#[must_use]
pub fn assign_file_names(memories: &[Memory]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    memories
        .iter()
        .map(|memory| {
            let base = memory.file_name();
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;

            if *count == 1 {
                base
            } else {
                let ext = memory.kind().extension();
                let stem = base.strip_suffix(ext).unwrap_or(&base);
                format!("{stem}_{count}{ext}")
            }
        })
        .collect()
}
