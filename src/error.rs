//! Error taxonomy for archive operations
//!
//! Validation, permission, not-found and storage failures are kept apart so
//! batch callers can label each failed item with a stable kind.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::component::ComponentId;

/// Reasons an archive, its manifest, or its metadata is rejected
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsafe zip entry: {0}")]
    UnsafeEntry(String),

    #[error("File too large: {name} ({size} bytes, limit {limit})")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    #[error("Zip total size exceeds limit ({total} > {limit} bytes)")]
    TotalSizeExceeded { total: u64, limit: u64 },

    #[error("Too many zip entries ({count} > {limit})")]
    TooManyEntries { count: usize, limit: usize },

    #[error("Compression ratio too high: {name} ({ratio:.1} > {limit})")]
    CompressionRatio { name: String, ratio: f64, limit: f64 },

    #[error("Invalid compression size: {0}")]
    InvalidCompressedSize(String),

    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    #[error("{0} missing")]
    MissingEntry(String),

    #[error("Malformed {file}: {reason}")]
    MalformedJson { file: String, reason: String },

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Missing file: {0}")]
    MissingFile(String),

    #[error("Checksum mismatch: {path}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch: {path} (expected {expected}, got {actual})")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("Content hash mismatch: expected {expected}, got {actual}")]
    ContentHashMismatch { expected: String, actual: String },

    #[error("Component hash mismatch: {0}")]
    ComponentHashMismatch(ComponentId),

    #[error("missing required components: {}", join_ids(.0))]
    MissingRequiredComponents(Vec<ComponentId>),

    #[error("Assets included but corresponding feature is disabled: {}", join_ids(.0))]
    FeatureMismatch(Vec<ComponentId>),

    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    #[error("Test case is not ready")]
    TestCaseNotReady,

    #[error("testcase.zip is not a valid zip archive: {0}")]
    InvalidTestCase(String),

    #[error("courses must be a non-empty list")]
    NoTargetCourses,
}

fn join_ids(ids: &[ComponentId]) -> String {
    ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
}

/// Failures of the external object or document store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Object store error on {key}: {reason}")]
    Object { key: String, reason: String },

    #[error("Document store error: {0}")]
    Document(String),
}

/// Top-level error for export and import operations
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] noj_canon::CanonError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => ArchiveError::Io(e),
            other => ArchiveError::Validation(ValidationError::MalformedContainer(other.to_string())),
        }
    }
}

/// Stable label for an error, reported in batch failure entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Permission,
    NotFound,
    Storage,
    Encoding,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Storage => "storage",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ArchiveError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::Validation(_) => ErrorKind::Validation,
            ArchiveError::Permission(_) => ErrorKind::Permission,
            ArchiveError::NotFound(_) => ErrorKind::NotFound,
            ArchiveError::Storage(_) => ErrorKind::Storage,
            ArchiveError::Encoding(_) => ErrorKind::Encoding,
            ArchiveError::Io(_) => ErrorKind::Io,
        }
    }

    /// Borrow the validation reason, if this is a validation failure
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            ArchiveError::Validation(v) => Some(v),
            _ => None,
        }
    }
}

/// Result alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_components_message() {
        let err = ValidationError::MissingRequiredComponents(vec![ComponentId::Checker]);
        assert_eq!(err.to_string(), "missing required components: assets.checker");
    }

    #[test]
    fn test_feature_mismatch_lists_ids() {
        let err = ValidationError::FeatureMismatch(vec![
            ComponentId::Checker,
            ComponentId::NetworkDockerfile,
        ]);
        let msg = err.to_string();
        assert!(msg.contains("assets.checker, assets.network_dockerfile"));
    }

    #[test]
    fn test_kind_labels() {
        let err = ArchiveError::Permission("course A".to_string());
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(err.kind().as_str(), "permission");

        let err: ArchiveError = ValidationError::TestCaseNotReady.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.as_validation().is_some());

        let err: ArchiveError = StorageError::Document("down".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_zip_io_error_maps_to_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "disk");
        let err: ArchiveError = zip::result::ZipError::Io(io_err).into();
        assert_eq!(err.kind(), ErrorKind::Io);

        let err: ArchiveError = zip::result::ZipError::FileNotFound.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
