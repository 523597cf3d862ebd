//! HTML export parser.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;

use super::Memory;

/// Errors raised while building the parser.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid selector '{selector}': {reason}")]
    Selector {
        selector: &'static str,
        reason: String,
    },

    #[error("Invalid link pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Extracts memories from the Snapchat `memories_history.html` export.
///
/// The export is a table with one row per memory: date, media type,
/// location, and a cell whose link calls `downloadMemories('<url>', ...)`.
#[derive(Debug)]
pub struct ExportParser {
    row: Selector,
    cell: Selector,
    download_span: Selector,
    download_link: Selector,
    url_pattern: Regex,
}

impl ExportParser {
    /// Creates a parser.
    ///
    /// # Errors
    ///
    /// Returns an error if a selector or the link pattern fails to compile.
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            row: selector("tr")?,
            cell: selector("td")?,
            download_span: selector("span.require-js-enabled")?,
            download_link: selector("a[onclick]")?,
            url_pattern: Regex::new(r"downloadMemories\('([^']+)'")?,
        })
    }

    /// Parses an export page and returns every memory with a download link.
    ///
    /// The first row is the table header and is always skipped. Rows with
    /// fewer than four cells or without a recognisable link are ignored.
    #[must_use]
    pub fn parse(&self, html: &str) -> Vec<Memory> {
        let document = Html::parse_document(html);

        let memories: Vec<Memory> = document
            .select(&self.row)
            .skip(1)
            .filter_map(|row| self.parse_row(row))
            .collect();

        debug!("Parsed {} memories from export", memories.len());
        memories
    }

    fn parse_row(&self, row: ElementRef<'_>) -> Option<Memory> {
        let cols: Vec<ElementRef<'_>> = row.select(&self.cell).collect();
        if cols.len() < 4 {
            return None;
        }

        let link = cols[3]
            .select(&self.download_span)
            .next()?
            .select(&self.download_link)
            .next()?;
        let onclick = link.value().attr("onclick")?;
        let download_url = self.url_pattern.captures(onclick)?.get(1)?.as_str().to_owned();

        Some(Memory {
            date: cell_text(cols[0]),
            media_type: cell_text(cols[1]),
            location: cell_text(cols[2]),
            download_url,
            is_get_request: onclick.to_lowercase().contains("true"),
        })
    }
}

/// Parses an export page with a one-off parser.
///
/// # Errors
///
/// Returns an error if the parser cannot be built.
pub fn parse_export(html: &str) -> Result<Vec<Memory>, ParseError> {
    Ok(ExportParser::new()?.parse(html))
}

fn selector(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector {
        selector: css,
        reason: e.to_string(),
    })
}

/// Concatenates the trimmed text nodes of a cell.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"
<html><body>
<table>
  <tr><th>Date</th><th>Media Type</th><th>Location</th><th></th></tr>
  <tr>
    <td>2023-05-01 12:30:00 UTC</td>
    <td>Image</td>
    <td>Latitude, Longitude: 52.1, 4.3</td>
    <td><span class="require-js-enabled"><a href="" onclick="downloadMemories('https://app.snapchat.com/dmd/memories?uid=1&amp;sid=2', this, true); return false;">Download</a></span></td>
  </tr>
  <tr>
    <td> 2023-05-02 08:00:00 UTC </td>
    <td>Video</td>
    <td>Latitude, Longitude: 0.0, 0.0</td>
    <td><span class="require-js-enabled"><a href="" onclick="downloadMemories('https://app.snapchat.com/dmd/memories?uid=3', this, false);">Download</a></span></td>
  </tr>
  <tr>
    <td>2023-05-03 09:00:00 UTC</td>
    <td>Image</td>
    <td>Somewhere</td>
    <td><a href="https://example.com">No span</a></td>
  </tr>
  <tr><td>short</td><td>row</td></tr>
</table>
</body></html>
"#;

    #[test]
    fn test_parse_export() {
        let parser = ExportParser::new().unwrap();
        let memories = parser.parse(EXPORT);

        assert_eq!(memories.len(), 2);

        assert_eq!(memories[0].date, "2023-05-01 12:30:00 UTC");
        assert_eq!(memories[0].media_type, "Image");
        assert_eq!(memories[0].location, "Latitude, Longitude: 52.1, 4.3");
        assert_eq!(
            memories[0].download_url,
            "https://app.snapchat.com/dmd/memories?uid=1&sid=2"
        );
        assert!(memories[0].is_get_request);

        assert_eq!(memories[1].date, "2023-05-02 08:00:00 UTC");
        assert_eq!(memories[1].media_type, "Video");
        assert!(!memories[1].is_get_request);
    }

    #[test]
    fn test_parse_skips_first_row_even_with_data() {
        let parser = ExportParser::new().unwrap();
        let html = r#"<table>
            <tr><td>a</td><td>Image</td><td>x</td><td><span class="require-js-enabled"><a onclick="downloadMemories('https://e/1')">d</a></span></td></tr>
            <tr><td>b</td><td>Image</td><td>y</td><td><span class="require-js-enabled"><a onclick="downloadMemories('https://e/2')">d</a></span></td></tr>
        </table>"#;

        let memories = parser.parse(html);
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].download_url, "https://e/2");
    }

    #[test]
    fn test_parse_link_without_pattern() {
        let parser = ExportParser::new().unwrap();
        let html = r#"<table><tr><th>h</th></tr>
            <tr><td>a</td><td>Image</td><td>x</td><td><span class="require-js-enabled"><a onclick="openMemory(1)">d</a></span></td></tr>
        </table>"#;

        assert!(parser.parse(html).is_empty());
    }

    #[test]
    fn test_parse_not_an_export() {
        let parser = ExportParser::new().unwrap();
        assert!(parser.parse("<html><body><p>Hello</p></body></html>").is_empty());
        assert!(parser.parse("").is_empty());
    }

    #[test]
    fn test_parse_export_one_off() {
        let memories = parse_export(EXPORT).unwrap();
        assert_eq!(memories.len(), 2);
        assert_eq!(memories[1].kind(), crate::memories::MediaKind::Video);
    }
}
