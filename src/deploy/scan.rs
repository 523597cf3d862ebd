//! Secret scanner for built images.
//!
//! Walks a `docker save` archive, descending into layer tarballs and gzip
//! blobs, and reports every entry whose content contains the secret. Image
//! configs (which carry `ENV` and build history) are scanned as well.
//!
//! Everything is streamed: nested archives are read entry by entry and
//! leaf blobs in fixed-size chunks, so memory use does not grow with layer
//! size.

use std::io::{ErrorKind, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, warn};

/// Shortest needle accepted; shorter ones match too much by accident.
pub const MIN_SECRET_LEN: usize = 8;

/// Nesting depth at which archives are no longer opened.
const MAX_DEPTH: usize = 8;

/// Bytes read up front to tell gzip, tar and plain blobs apart.
const SNIFF_LEN: usize = 512;

/// Read size for leaf blobs.
const CHUNK_LEN: usize = 64 * 1024;

/// Errors raised while scanning.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Secret must be at least {MIN_SECRET_LEN} bytes long")]
    SecretTooShort,

    #[error("Failed to read archive: {0}")]
    Io(#[from] std::io::Error),
}

/// A location where the secret was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Archive entry path, nested archives joined with `!/`.
    pub location: String,

    /// Byte offset of the first match within that entry.
    pub offset: usize,
}

/// Scans an image archive (`docker save` output) for `secret`.
///
/// # Errors
///
/// Returns an error if the secret is too short or the archive cannot be read.
pub fn scan_archive<R: Read>(reader: R, secret: &[u8]) -> Result<Vec<Finding>, ScanError> {
    check_secret(secret)?;

    let mut findings = Vec::new();
    scan_tar(reader, secret, "", 0, &mut findings)?;
    Ok(findings)
}

/// Scans an image archive on disk.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn scan_archive_file(path: impl AsRef<Path>, secret: &[u8]) -> Result<Vec<Finding>, ScanError> {
    let file = std::fs::File::open(path)?;
    scan_archive(std::io::BufReader::new(file), secret)
}

/// Scans a single plain file (e.g. a Dockerfile).
///
/// # Errors
///
/// Returns an error if the secret is too short or the file cannot be read.
pub fn scan_file(path: impl AsRef<Path>, secret: &[u8]) -> Result<Option<Finding>, ScanError> {
    check_secret(secret)?;

    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let mut findings = Vec::new();
    scan_leaf(file, secret, &path.display().to_string(), &mut findings)?;
    Ok(findings.pop())
}

fn check_secret(secret: &[u8]) -> Result<(), ScanError> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(ScanError::SecretTooShort);
    }
    Ok(())
}

fn scan_tar<R: Read>(
    reader: R,
    secret: &[u8],
    prefix: &str,
    depth: usize,
    findings: &mut Vec<Finding>,
) -> Result<(), ScanError> {
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry.path()?.display().to_string();
        let location = format!("{prefix}{name}");

        scan_blob(&mut entry, secret, &location, depth, findings)?;
    }

    Ok(())
}

fn scan_blob(
    reader: &mut dyn Read,
    secret: &[u8],
    location: &str,
    depth: usize,
    findings: &mut Vec<Finding>,
) -> Result<(), ScanError> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    Read::take(&mut *reader, SNIFF_LEN as u64).read_to_end(&mut head)?;
    let stream = head.as_slice().chain(&mut *reader);

    if depth < MAX_DEPTH {
        if is_gzip(&head) {
            debug!("Descending into gzip blob {}", location);
            let mut decoder = GzDecoder::new(stream);
            return scan_blob(&mut decoder, secret, location, depth + 1, findings);
        }
        if is_tar(&head) {
            debug!("Descending into archive {}", location);
            return scan_tar(stream, secret, &format!("{location}!/"), depth + 1, findings);
        }
    }

    scan_leaf(stream, secret, location, findings)
}

/// Searches a blob chunk by chunk, keeping the last `secret.len() - 1`
/// bytes of each chunk so matches across chunk boundaries are found.
fn scan_leaf<R: Read>(
    mut reader: R,
    secret: &[u8],
    location: &str,
    findings: &mut Vec<Finding>,
) -> Result<(), ScanError> {
    let overlap = secret.len() - 1;
    let mut buf = vec![0u8; CHUNK_LEN];
    let mut window: Vec<u8> = Vec::with_capacity(CHUNK_LEN + overlap);
    let mut window_start = 0usize;

    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        window.extend_from_slice(&buf[..read]);

        if let Some(pos) = find(&window, secret) {
            let offset = window_start + pos;
            warn!("Secret found in {} at offset {}", location, offset);
            findings.push(Finding {
                location: location.to_owned(),
                offset,
            });
            return Ok(());
        }

        let consumed = window.len().saturating_sub(overlap);
        window.drain(..consumed);
        window_start += consumed;
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn is_gzip(content: &[u8]) -> bool {
    content.starts_with(&[0x1f, 0x8b])
}

/// POSIX tar headers carry `ustar` at offset 257.
fn is_tar(content: &[u8]) -> bool {
    content.get(257..262) == Some(b"ustar".as_slice())
}
