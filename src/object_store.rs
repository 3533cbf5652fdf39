//! Object store abstraction and the data model shared by all backends.
//!
//! Both providers (SDK-authenticated S3 and the unsigned REST upload API)
//! implement the [`ObjectStore`] trait so the coordinator and loader never
//! couple to a concrete service. Key generation is centralized here so every
//! backend produces and parses the same layout:
//!
//! `{namespace}/{YYYY-MM-DD}/{HHMMSSmmm}_{uuid}_{sanitized_name}`
//!
//! The date level supports lifecycle policies and time-scoped queries, the
//! timestamp+uuid filename guarantees uniqueness under concurrent guest
//! uploads, and the trailing segment keeps the display name recoverable.

use crate::error::StoreResult;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A file selected by a guest in one picker interaction.
///
/// Transient: lives only for the duration of one upload batch.
#[derive(Debug, Clone)]
pub struct FileHandle {
    /// Display name as the guest's device reported it
    pub name: String,
    /// MIME type of the payload
    pub content_type: String,
    /// Raw payload
    pub data: Bytes,
    /// Last-modified time reported by the picker, if any
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileHandle {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
            modified_at: None,
        }
    }

    /// Build a handle for a picker that reported no MIME type, guessing it
    /// from the file extension.
    pub fn with_guessed_type(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        let content_type = guess_content_type(&name).to_string();
        Self {
            name,
            content_type,
            data: data.into(),
            modified_at: None,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// The durable result of one successful upload or one enumerated object.
///
/// Immutable once constructed. `name` is not guaranteed unique across
/// records; uniqueness of stored objects is the store's concern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadRecord {
    /// Display name of the uploaded file
    pub name: String,
    /// Absolute, publicly fetchable URL resolving to the uploaded bytes
    pub url: String,
    /// When the object was stored
    pub uploaded_at: DateTime<Utc>,
}

/// Result of one successful `put`.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object key the store filed the bytes under
    pub key: String,
    /// Publicly fetchable URL for the object
    pub url: String,
    /// Creation timestamp reported by the store
    pub created_at: DateTime<Utc>,
}

/// Handle to one object discovered during enumeration.
///
/// Backends that already learn the URL or creation time while listing cache
/// them here so `metadata`/`url` resolve without another round-trip; backends
/// that list keys only leave the optional fields empty.
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    /// Object key
    pub key: String,
    /// Display name recovered from the key
    pub display_name: String,
    /// Public URL, when the listing response carried it
    pub url: Option<String>,
    /// Creation timestamp, when the listing response carried it
    pub created_at: Option<DateTime<Utc>>,
}

/// Metadata for one stored object.
#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    /// When the object was stored
    pub created_at: DateTime<Utc>,
    /// Object size, when the store reports it
    pub size_bytes: Option<u64>,
    /// Original display name, when the store kept it
    pub original_name: Option<String>,
}

/// One byte-level progress tick from an in-flight upload task.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    /// Position of the file within its batch
    pub file_index: usize,
    /// Bytes transferred so far
    pub bytes_sent: u64,
    /// Total payload size for this file
    pub total_bytes: u64,
}

/// Per-file progress reporter handed to `put`.
///
/// Ticks flow over an unbounded channel to the batch aggregator; a dropped
/// receiver turns every tick into a no-op, so backends can always report.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    file_index: usize,
    total_bytes: u64,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    pub fn new(
        file_index: usize,
        total_bytes: u64,
        tx: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Self {
        Self {
            file_index,
            total_bytes,
            tx,
        }
    }

    /// A sender with no listener, for callers that don't track progress.
    pub fn discard(total_bytes: u64) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self::new(0, total_bytes, tx)
    }

    /// Report cumulative bytes transferred. Over-reports are clamped.
    pub fn sent(&self, bytes_sent: u64) {
        let _ = self.tx.send(ProgressEvent {
            file_index: self.file_index,
            bytes_sent: bytes_sent.min(self.total_bytes),
            total_bytes: self.total_bytes,
        });
    }

    /// Report the full payload as transferred.
    pub fn complete(&self) {
        self.sent(self.total_bytes);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Object store abstraction
///
/// All storage backends must implement this trait. The upload coordinator
/// and gallery loader work exclusively through it, so backends (or a mock,
/// in tests) substitute freely.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key` and return the resulting object's public URL
    /// and creation timestamp. Byte-level progress is reported through
    /// `progress` as the transfer advances.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        progress: ProgressSender,
    ) -> StoreResult<StoredObject>;

    /// Enumerate every object under the given logical namespace.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectHandle>>;

    /// Fetch metadata (at minimum the creation timestamp) for one object.
    async fn metadata(&self, handle: &ObjectHandle) -> StoreResult<ObjectMetadata>;

    /// Resolve the publicly fetchable URL for one object.
    async fn url(&self, handle: &ObjectHandle) -> StoreResult<String>;
}

/// Generate a collision-free object key for an uploaded file.
pub fn generate_object_key(namespace: &str, file_name: &str) -> String {
    let now = Utc::now();
    format!(
        "{namespace}/{date}/{time}_{id}_{name}",
        namespace = namespace.trim_matches('/'),
        date = now.format("%Y-%m-%d"),
        time = now.format("%H%M%S%3f"),
        id = Uuid::new_v4(),
        name = sanitize_file_name(file_name),
    )
}

/// Sanitize a display name for use as a key segment.
///
/// Keeps dots so the extension survives; everything outside the safe set
/// becomes `_`. Never returns an empty segment.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Recover the sanitized display name from a generated key.
///
/// The timestamp and uuid segments never contain `_`, so the third split
/// field is the name. Keys from other producers fall back to the basename.
pub fn display_name_from_key(key: &str) -> String {
    let base = key.rsplit('/').next().unwrap_or(key);
    base.splitn(3, '_')
        .nth(2)
        .filter(|name| !name.is_empty())
        .unwrap_or(base)
        .to_string()
}

/// Guess a MIME type from the file extension, for pickers that report none.
pub fn guess_content_type(name: &str) -> &'static str {
    let extension = name.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("wedding-001.jpg"), "wedding-001.jpg");
        assert_eq!(sanitize_file_name("our day.png"), "our_day.png");
        assert_eq!(sanitize_file_name("cake/смотри.mp4"), "cake_______.mp4");
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name("..."), "file");
    }

    #[test]
    fn test_key_round_trip() {
        let key = generate_object_key("uploads", "first dance.mp4");
        assert!(key.starts_with("uploads/"));
        assert_eq!(display_name_from_key(&key), "first_dance.mp4");
    }

    #[test]
    fn test_display_name_from_foreign_key() {
        // Keys not produced by generate_object_key fall back to the basename.
        assert_eq!(display_name_from_key("uploads/someobject"), "someobject");
        assert_eq!(display_name_from_key("plain.jpg"), "plain.jpg");
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("a.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("clip.mov"), "video/quicktime");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");

        let file = FileHandle::with_guessed_type("IMG_0042.heic", vec![0u8; 8]);
        assert_eq!(file.content_type, "image/heic");
    }

    #[test]
    fn test_progress_sender_clamps() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = ProgressSender::new(2, 100, tx);
        sender.sent(250);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.file_index, 2);
        assert_eq!(event.bytes_sent, 100);
        assert_eq!(event.total_bytes, 100);
    }

    #[test]
    fn test_progress_sender_discard_is_silent() {
        let sender = ProgressSender::discard(10);
        sender.sent(5);
        sender.complete();
    }
}
