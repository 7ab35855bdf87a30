//! Offline integrity check of a container
//!
//! Re-digests every listed file, recomputes component hashes from the file
//! table and checks the content hash. Nothing is written anywhere.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::Container;
use crate::component::ComponentId;
use crate::error::{Result, ValidationError};
use crate::manifest::{component_hash, BatchManifest, FileRecord, Manifest, MANIFEST_FILE};
use crate::writer::normalize_prefix;

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub batch: bool,
    pub problems: Vec<VerifiedProblem>,
    /// Problems the exporter listed as failed, plus entries without a
    /// folder (batch only)
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedProblem {
    /// Folder prefix, empty for a single-problem container
    pub folder: String,
    pub problem_content_hash: String,
    pub components: Vec<ComponentId>,
    pub files: usize,
    pub bytes: u64,
}

/// Verify the single problem or batch rooted at `prefix`
pub fn verify_archive<R: Read + Seek>(
    container: &mut Container<R>,
    prefix: &str,
    chunk_size: usize,
) -> Result<VerifyReport> {
    let prefix = normalize_prefix(prefix);
    let root: Value = container.read_json(&format!("{}{}", prefix, MANIFEST_FILE))?;

    if !BatchManifest::looks_like_batch(&root) {
        let problem = verify_problem(container, &prefix, chunk_size)?;
        return Ok(VerifyReport {
            batch: false,
            problems: vec![problem],
            failed: 0,
        });
    }

    let batch: BatchManifest = serde_json::from_value(root).map_err(|e| ValidationError::MalformedJson {
        file: MANIFEST_FILE.to_string(),
        reason: e.to_string(),
    })?;
    let mut problems = Vec::with_capacity(batch.problems.len());
    let mut failed = batch.failed.len();
    for entry in &batch.problems {
        let Some(folder) = entry.folder.as_deref() else {
            warn!(original_id = ?entry.original_id, "batch entry has no folder");
            failed += 1;
            continue;
        };
        let problem = verify_problem(container, &format!("{}{}", prefix, normalize_prefix(folder)), chunk_size)?;
        if let Some(expected) = entry.problem_content_hash.as_deref() {
            if expected != problem.problem_content_hash {
                return Err(ValidationError::ContentHashMismatch {
                    expected: expected.to_string(),
                    actual: problem.problem_content_hash,
                }
                .into());
            }
        }
        problems.push(problem);
    }

    Ok(VerifyReport {
        batch: true,
        problems,
        failed,
    })
}

fn verify_problem<R: Read + Seek>(
    container: &mut Container<R>,
    prefix: &str,
    chunk_size: usize,
) -> Result<VerifiedProblem> {
    let (manifest, _meta) = container.load_problem(prefix)?;
    debug!(prefix, files = manifest.files.len(), "verifying problem");

    let mut bytes = 0;
    for (path, entry) in &manifest.files {
        container.extract_verified(prefix, path, entry, &mut io::sink(), chunk_size)?;
        bytes += entry.size;
    }
    check_component_hashes(&manifest)?;
    manifest.verify_content_hash()?;

    Ok(VerifiedProblem {
        folder: prefix.trim_end_matches('/').to_string(),
        problem_content_hash: manifest.problem_content_hash.clone(),
        components: manifest.included_components().into_iter().collect(),
        files: manifest.files.len(),
        bytes,
    })
}

/// Recompute asset and test-case component hashes from the file table.
///
/// `core.meta` is bound to the metadata snapshot rather than the file bytes
/// and is covered by the content hash alone.
fn check_component_hashes(manifest: &Manifest) -> Result<()> {
    for (id, entry) in &manifest.components {
        if !entry.included || *id == ComponentId::CoreMeta {
            continue;
        }
        let mut records = Vec::with_capacity(entry.files.len());
        for path in &entry.files {
            let file = manifest
                .files
                .get(path)
                .ok_or_else(|| ValidationError::MissingFile(path.clone()))?;
            records.push(FileRecord {
                path: path.clone(),
                sha256: file.sha256.clone(),
                size: file.size,
            });
        }
        if component_hash(*id, &records)? != entry.hash {
            return Err(ValidationError::ComponentHashMismatch(*id).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArchiveConfig;
    use crate::mock::{sample_meta, zip_bytes, MockBackend, SeedProblem};
    use crate::store::Caller;
    use crate::writer::ArchiveWriter;
    use std::io::Cursor;
    use zip::ZipArchive;

    fn exported_bytes() -> Vec<u8> {
        let backend = MockBackend::new();
        let id = backend.seed(SeedProblem::new("teacher", sample_meta()));
        let config = ArchiveConfig::default();
        let writer = ArchiveWriter::new(backend.objects.as_ref(), backend.problems.as_ref(), &config);
        writer
            .export(&Caller::admin("root"), id, None)
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    fn open(bytes: Vec<u8>) -> Container<Cursor<Vec<u8>>> {
        Container::open(Cursor::new(bytes), &ArchiveConfig::default().limits).unwrap()
    }

    /// Copy every entry, replacing the bytes of `name`
    fn replace_entry(bytes: Vec<u8>, name: &str, data: &[u8]) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).unwrap();
            let buf = if file.name() == name { data.to_vec() } else { buf };
            entries.push((file.name().to_string(), buf));
        }
        let pairs: Vec<(&str, &[u8])> = entries.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
        zip_bytes(&pairs).unwrap()
    }

    #[test]
    fn test_verify_single() {
        let mut container = open(exported_bytes());
        let report = verify_archive(&mut container, "", 0).unwrap();
        assert!(!report.batch);
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].files, 2);
        assert!(report.problems[0].components.contains(&ComponentId::CoreTestcase));
    }

    #[test]
    fn test_batch_entry_without_folder_counts_as_failed() {
        let mut archive = ZipArchive::new(Cursor::new(exported_bytes())).unwrap();
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).unwrap();
            entries.push((format!("problem_1/{}", file.name()), buf));
        }
        let root = serde_json::json!({
            "formatVersion": "1.1",
            "problems": [{"folder": "problem_1", "originalId": 1}, {"originalId": 7}],
            "failed": [{"problemId": 9, "reason": "permission denied"}]
        });
        entries.push(("manifest.json".to_string(), serde_json::to_vec(&root).unwrap()));
        let pairs: Vec<(&str, &[u8])> = entries.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();

        let mut container = open(zip_bytes(&pairs).unwrap());
        let report = verify_archive(&mut container, "", 0).unwrap();
        assert!(report.batch);
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.failed, 2);
    }

    #[test]
    fn test_verify_detects_tampered_file() {
        let bytes = replace_entry(exported_bytes(), "testcase.zip", b"not the original");
        let mut container = open(bytes);
        let err = verify_archive(&mut container, "", 0).unwrap_err();
        assert_eq!(err.to_string(), "Checksum mismatch: testcase.zip");
    }

    #[test]
    fn test_verify_detects_tampered_content_hash() {
        let bytes = exported_bytes();
        let mut manifest: Manifest = {
            let mut archive = ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
            let mut text = String::new();
            archive.by_name("manifest.json").unwrap().read_to_string(&mut text).unwrap();
            serde_json::from_str(&text).unwrap()
        };
        manifest.problem_content_hash = "sha256:00".to_string();
        let bytes = replace_entry(bytes, "manifest.json", &serde_json::to_vec(&manifest).unwrap());

        let mut container = open(bytes);
        let err = verify_archive(&mut container, "", 0).unwrap_err();
        assert!(matches!(err.as_validation(), Some(ValidationError::ContentHashMismatch { .. })));
    }
}
