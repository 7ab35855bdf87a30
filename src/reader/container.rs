//! Opened, gated archive container
//!
//! Opening a [`Container`] runs the validation gate once over the central
//! directory. Entries are only inflated afterwards, one at a time, through
//! bounded readers.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use noj_canon::copy_with_digest;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use zip::ZipArchive;

use super::validate::{check_entries, check_entry_count, safe_entry_name, EntryInfo};
use crate::config::ArchiveLimits;
use crate::error::{Result, ValidationError};
use crate::manifest::{FileEntry, Manifest, MANIFEST_FILE, META_FILE};
use crate::meta::ProblemMeta;

/// Marker for read failures that come from the archive rather than the sink
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct CorruptEntry(String);

/// Tags every read error of an entry as [`CorruptEntry`]
struct EntryReader<R>(R);

impl<R: Read> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .read(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, CorruptEntry(e.to_string())))
    }
}

fn is_corrupt_entry(err: &io::Error) -> bool {
    err.get_ref().map_or(false, |inner| inner.is::<CorruptEntry>())
}

/// A zip container that has passed the validation gate
pub struct Container<R: Read + Seek> {
    zip: ZipArchive<R>,
    names: BTreeSet<String>,
}

impl Container<File> {
    pub fn open_path(path: &Path, limits: &ArchiveLimits) -> Result<Self> {
        Self::open(File::open(path)?, limits)
    }
}

impl<R: Read + Seek> Container<R> {
    /// Parse the central directory and gate every entry
    pub fn open(reader: R, limits: &ArchiveLimits) -> Result<Self> {
        let mut zip = ZipArchive::new(reader)?;
        check_entry_count(zip.len(), limits)?;
        let mut entries = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let file = zip.by_index_raw(index)?;
            entries.push(EntryInfo {
                name: file.name().to_string(),
                size: file.size(),
                compressed_size: file.compressed_size(),
                is_dir: file.is_dir(),
            });
        }
        check_entries(&entries, limits)?;

        let names = entries
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.name)
            .collect();
        Ok(Self { zip, names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// File entry names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Deserialize a JSON entry; a missing entry is `"<name> missing"`
    pub fn read_json<T: DeserializeOwned>(&mut self, name: &str) -> Result<T> {
        if !self.contains(name) {
            return Err(ValidationError::MissingEntry(name.to_string()).into());
        }
        let mut bytes = Vec::new();
        EntryReader(self.zip.by_name(name)?)
            .read_to_end(&mut bytes)
            .map_err(|e| ValidationError::MalformedContainer(format!("{}: {}", name, e)))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ValidationError::MalformedJson {
                file: name.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Manifest at the container root, untyped, for batch detection
    pub fn root_manifest(&mut self) -> Result<Value> {
        self.read_json(MANIFEST_FILE)
    }

    /// Manifest and metadata of the problem stored under `prefix`.
    ///
    /// Both entries must be present; manifest absence is reported first.
    pub fn load_problem(&mut self, prefix: &str) -> Result<(Manifest, ProblemMeta)> {
        let manifest_name = format!("{}{}", prefix, MANIFEST_FILE);
        let meta_name = format!("{}{}", prefix, META_FILE);
        for (name, label) in [(&manifest_name, MANIFEST_FILE), (&meta_name, META_FILE)] {
            if !self.contains(name) {
                return Err(ValidationError::MissingEntry(label.to_string()).into());
            }
        }
        let manifest = self.read_json(&manifest_name)?;
        let meta = self.read_json(&meta_name)?;
        Ok((manifest, meta))
    }

    /// Stream `prefix + rel_path` into `writer` and check it against its
    /// manifest entry.
    ///
    /// At most one byte beyond the declared size is read, so an entry whose
    /// header lies about its size cannot flood the sink. An entry whose data
    /// fails to inflate or fails its CRC cannot hold the listed bytes and is
    /// reported as a checksum mismatch.
    pub fn extract_verified<W: Write + ?Sized>(
        &mut self,
        prefix: &str,
        rel_path: &str,
        expected: &FileEntry,
        writer: &mut W,
        chunk_size: usize,
    ) -> Result<()> {
        let name = format!("{}{}", prefix, rel_path);
        if !safe_entry_name(rel_path) || !safe_entry_name(&name) {
            return Err(ValidationError::UnsafeEntry(name).into());
        }
        if !self.contains(&name) {
            return Err(ValidationError::MissingFile(rel_path.to_string()).into());
        }

        let entry = self.zip.by_name(&name)?;
        let mut reader = EntryReader(entry.take(expected.size.saturating_add(1)));
        let (sha256, size) = match copy_with_digest(&mut reader, writer, chunk_size) {
            Ok(result) => result,
            Err(e) if is_corrupt_entry(&e) => {
                debug!(path = rel_path, error = %e, "entry data unreadable");
                return Err(ValidationError::ChecksumMismatch {
                    path: rel_path.to_string(),
                    expected: expected.sha256.clone(),
                    actual: format!("unreadable ({})", e),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        if sha256 != expected.sha256 {
            return Err(ValidationError::ChecksumMismatch {
                path: rel_path.to_string(),
                expected: expected.sha256.clone(),
                actual: sha256,
            }
            .into());
        }
        if size != expected.size {
            return Err(ValidationError::SizeMismatch {
                path: rel_path.to_string(),
                expected: expected.size,
                actual: size,
            }
            .into());
        }
        Ok(())
    }
}
