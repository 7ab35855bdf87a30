//! Error types for canonicalization and digesting.

use std::io;

/// Errors raised while canonicalizing or digesting data
#[derive(Debug, thiserror::Error)]
pub enum CanonError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("JCS canonicalization error: {0}")]
    JcsError(String),
}
