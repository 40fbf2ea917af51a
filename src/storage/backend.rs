//! Abstract storage backend trait.
//!
//! Every storage backend must implement [`StorageBackend`].  The trait
//! is read-only and works in terms of lazy byte streams so callers never
//! hold a whole object in memory.

use bytes::Bytes;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::range::ByteRange;

/// Content type reported when the store does not know one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Lazily produced object bytes.  Dropping the stream releases the
/// underlying upstream resource (HTTP body, file handle).
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Boxed future returned by every backend operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Per-request snapshot of an object's size and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Total object length in bytes.
    pub total_length: u64,
    /// MIME type.
    pub content_type: String,
}

/// One object in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    /// Full key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
}

/// Immediate children of a prefix, split on `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Common prefixes, each ending in `/`.
    pub folders: Vec<String>,
    /// Objects directly under the prefix.
    pub files: Vec<ListedObject>,
}

/// Failures reported by a backend.
///
/// The HTTP layer answers 404 for both variants; they stay distinct so the
/// cause can be logged and counted.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key does not exist.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The store could not be reached or refused the request.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl StoreError {
    /// Short label used for logs and metrics.
    pub fn cause(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Unavailable(_) => "unavailable",
        }
    }
}

/// Async, read-only object storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Fetch size and content type for `key` without its body.
    fn head(&self, key: &str) -> StoreFuture<'_, ObjectMetadata>;

    /// Open a stream over `key`, restricted to `range` when given.
    fn get(&self, key: &str, range: Option<ByteRange>) -> StoreFuture<'_, ByteStream>;

    /// List the immediate children of `prefix`.
    fn list(&self, prefix: &str) -> StoreFuture<'_, Listing>;
}

/// Pick a MIME type from a key's extension.
///
/// Used by backends that do not store a content type of their own.
pub fn content_type_for_key(key: &str) -> &'static str {
    let ext = key
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4" | "m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("ogg" | "oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        Some("txt" | "log") => "text/plain",
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("srt") => "application/x-subrip",
        Some("vtt") => "text/vtt",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_for_key("movies/clip.mp4"), "video/mp4");
        assert_eq!(content_type_for_key("Music/Song.MP3"), "audio/mpeg");
        assert_eq!(content_type_for_key("notes.txt"), "text/plain");
    }

    #[test]
    fn test_content_type_fallback() {
        assert_eq!(content_type_for_key("README"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for_key("dir.v2/blob"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for_key("archive.unknown"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_store_error_cause_labels() {
        let missing = StoreError::NotFound {
            key: "a".to_string(),
        };
        assert_eq!(missing.cause(), "not_found");
        let down = StoreError::Unavailable(anyhow::anyhow!("connection refused"));
        assert_eq!(down.cause(), "unavailable");
    }
}
