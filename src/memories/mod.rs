//! Snapchat Memories export handling.
//!
//! Parses the `memories_history.html` page of a Snapchat data export and
//! downloads the media it links to.

mod downloader;
mod parser;

use std::fmt;

pub use downloader::{DownloadError, DownloadedMemory, MemoryDownloader, assign_file_names};
pub use parser::{ExportParser, ParseError, parse_export};

/// A single memory listed in an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    /// Capture date as printed in the export (e.g. `2023-05-01 12:30:00 UTC`).
    pub date: String,

    /// Media type column (`Image`, `Video`).
    pub media_type: String,

    /// Location column, often `Latitude, Longitude: 0.0, 0.0`.
    pub location: String,

    /// Signed download URL extracted from the row.
    pub download_url: String,

    /// Whether the link is a direct GET that needs the route tag header.
    pub is_get_request: bool,
}

impl Memory {
    /// Returns the kind of media this memory holds.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_media_type(&self.media_type)
    }

    /// Caption used when the memory is posted to the chat.
    #[must_use]
    pub fn caption(&self) -> String {
        format!(
            "📅 {}\n📹 {}\n📍 {}",
            self.date, self.media_type, self.location
        )
    }

    /// Base file name derived from the date and media type (no collision handling).
    #[must_use]
    pub fn file_name(&self) -> String {
        let safe_date = sanitize(&self.date.replace(':', "-").replace(' ', "_"));
        let media_type = sanitize(&self.media_type);
        format!("{safe_date}_{media_type}{}", self.kind().extension())
    }
}

/// Kind of media, which decides the file extension and the upload method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classifies a media type column value.
    #[must_use]
    pub fn from_media_type(media_type: &str) -> Self {
        if media_type.trim().eq_ignore_ascii_case("video") {
            Self::Video
        } else {
            Self::Image
        }
    }

    /// File extension including the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Image => ".jpg",
            Self::Video => ".mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Drops characters that cannot appear in a file name.
fn sanitize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect()
}
