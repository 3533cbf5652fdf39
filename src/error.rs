use thiserror::Error;

/// Result type for object store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Object store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Listing failed: {0}")]
    ListFailed(String),

    #[error("Metadata fetch failed: {0}")]
    MetadataFailed(String),

    #[error("URL resolution failed: {0}")]
    UrlFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Store configuration error: {0}")]
    ConfigError(String),
}

impl StoreError {
    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn list_failed(msg: impl Into<String>) -> Self {
        Self::ListFailed(msg.into())
    }

    pub fn metadata_failed(msg: impl Into<String>) -> Self {
        Self::MetadataFailed(msg.into())
    }

    pub fn url_failed(msg: impl Into<String>) -> Self {
        Self::UrlFailed(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Result type for gallery core operations
pub type GalleryResult<T> = Result<T, GalleryError>;

/// Gallery core errors
///
/// Per-file errors (`CompressionFailed`, `UploadFailed`) never abort the
/// batch they belong to; `Enumeration` fails a whole gallery load.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Compression failed for {name}: {reason}")]
    CompressionFailed { name: String, reason: String },

    #[error("Upload failed for {name}: {source}")]
    UploadFailed {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("Gallery enumeration failed: {0}")]
    Enumeration(#[source] StoreError),
}

impl GalleryError {
    pub fn compression_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CompressionFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn upload_failed(name: impl Into<String>, source: StoreError) -> Self {
        Self::UploadFailed {
            name: name.into(),
            source,
        }
    }

    /// Check if this error is scoped to a single file (batch continues).
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            GalleryError::CompressionFailed { .. } | GalleryError::UploadFailed { .. }
        )
    }

    /// The display name of the affected file, if the error is file-scoped.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            GalleryError::CompressionFailed { name, .. } => Some(name),
            GalleryError::UploadFailed { name, .. } => Some(name),
            GalleryError::Enumeration(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_file_scope() {
        assert!(GalleryError::compression_failed("a.jpg", "decode error").is_per_file());
        assert!(
            GalleryError::upload_failed("b.mp4", StoreError::upload_failed("timeout"))
                .is_per_file()
        );
        assert!(!GalleryError::Enumeration(StoreError::list_failed("boom")).is_per_file());
    }

    #[test]
    fn test_file_name() {
        let err = GalleryError::upload_failed("b.mp4", StoreError::upload_failed("timeout"));
        assert_eq!(err.file_name(), Some("b.mp4"));
        assert_eq!(
            GalleryError::Enumeration(StoreError::list_failed("boom")).file_name(),
            None
        );
    }
}
