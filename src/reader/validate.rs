//! Validation gate over central-directory metadata
//!
//! Runs before any entry is inflated. Only declared sizes and names are
//! inspected.

use crate::config::ArchiveLimits;
use crate::error::ValidationError;

/// Central-directory facts about one entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
}

/// Whether an entry name stays inside the extraction root.
///
/// Rejects absolute and backslash-rooted names, drive letters, and any
/// `..` segment under either separator.
pub fn safe_entry_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('/') || name.starts_with('\\') {
        return false;
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return false;
    }
    !name.split(['/', '\\']).any(|segment| segment == "..")
}

/// Reject containers with more central-directory entries than allowed.
///
/// Empty entries add nothing to the total size, so the count is bounded
/// separately.
pub fn check_entry_count(count: usize, limits: &ArchiveLimits) -> Result<(), ValidationError> {
    if count > limits.max_entries {
        return Err(ValidationError::TooManyEntries {
            count,
            limit: limits.max_entries,
        });
    }
    Ok(())
}

/// Check every entry against the limits, in central-directory order
pub fn check_entries(entries: &[EntryInfo], limits: &ArchiveLimits) -> Result<(), ValidationError> {
    check_entry_count(entries.len(), limits)?;
    let max_file = limits.max_file_size_bytes();
    let max_total = limits.max_total_size_bytes();
    let mut total: u64 = 0;

    for entry in entries.iter().filter(|e| !e.is_dir) {
        if !safe_entry_name(&entry.name) {
            return Err(ValidationError::UnsafeEntry(entry.name.clone()));
        }
        check_entry(entry, max_file, limits.max_compression_ratio)?;

        total = total.saturating_add(entry.size);
        if total > max_total {
            return Err(ValidationError::TotalSizeExceeded {
                total,
                limit: max_total,
            });
        }
    }
    Ok(())
}

fn check_entry(entry: &EntryInfo, max_file: u64, max_ratio: f64) -> Result<(), ValidationError> {
    if entry.size > max_file {
        return Err(ValidationError::FileTooLarge {
            name: entry.name.clone(),
            size: entry.size,
            limit: max_file,
        });
    }
    if entry.compressed_size == 0 {
        if entry.size > 0 {
            return Err(ValidationError::InvalidCompressedSize(entry.name.clone()));
        }
        return Ok(());
    }
    let ratio = entry.size as f64 / entry.compressed_size as f64;
    if ratio > max_ratio {
        return Err(ValidationError::CompressionRatio {
            name: entry.name.clone(),
            ratio,
            limit: max_ratio,
        });
    }
    Ok(())
}
