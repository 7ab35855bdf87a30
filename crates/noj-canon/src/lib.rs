//! Canonical serialization and digests for problem archives
//!
//! Everything that feeds a content-identity hash goes through this crate so
//! that two semantically equal metadata trees always hash the same way,
//! regardless of key order or line-ending style.

pub mod digest;
pub mod error;
pub mod json;

pub use digest::{
    copy_with_digest, digest, prefixed_digest, stream_digest, DEFAULT_CHUNK_SIZE, DIGEST_PREFIX,
};
pub use error::CanonError;
pub use json::{canonicalize, normalize_newlines, pretty};
