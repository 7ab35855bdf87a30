//! Archive writer
//!
//! Serializes one problem into the container format. Asset bytes are streamed
//! from the object store straight into the zip while being digested; nothing
//! is buffered whole. Every check that can reject the problem runs before the
//! first entry is written.

mod plan;

pub use plan::{AssetSource, ExportPlan};

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::Path;

use noj_canon::{copy_with_digest, digest, pretty, stream_digest};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::component::{ComponentFilter, ComponentId};
use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, Result};
use crate::manifest::{
    component_hash, meta_hash, problem_content_hash, ComponentEntry, FileEntry, FileRecord, Manifest,
    MANIFEST_FILE, META_FILE, TESTCASE_FILE,
};
use crate::store::{Caller, ObjectStore, ProblemRecord, ProblemStore};

/// A finished container on disk plus its manifest.
///
/// The file is removed when this value is dropped unless it is persisted.
#[derive(Debug)]
pub struct ExportedArchive<M> {
    file: NamedTempFile,
    manifest: M,
}

impl<M> ExportedArchive<M> {
    pub(crate) fn new(file: NamedTempFile, manifest: M) -> Self {
        Self { file, manifest }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn manifest(&self) -> &M {
        &self.manifest
    }

    /// Open a fresh read handle on the container
    pub fn open(&self) -> io::Result<File> {
        File::open(self.file.path())
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        fs::read(self.file.path())
    }

    /// Keep the container at `dest` and return the manifest
    pub fn persist(self, dest: &Path) -> io::Result<M> {
        self.file.persist(dest).map_err(|e| e.error)?;
        Ok(self.manifest)
    }

    pub fn into_parts(self) -> (NamedTempFile, M) {
        (self.file, self.manifest)
    }
}

/// Create the scratch file and a zip writer over it
pub(crate) fn new_container() -> Result<(NamedTempFile, ZipWriter<File>)> {
    let file = tempfile::Builder::new()
        .prefix("problem-export-")
        .suffix(".noj.zip")
        .tempfile()?;
    let zip = ZipWriter::new(file.reopen()?);
    Ok((file, zip))
}

pub(crate) fn entry_options() -> FileOptions {
    FileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Normalize a folder prefix to `""` or `"name/"`
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Exports problems from the stores into containers
pub struct ArchiveWriter<'a> {
    objects: &'a dyn ObjectStore,
    problems: &'a dyn ProblemStore,
    config: &'a ArchiveConfig,
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(objects: &'a dyn ObjectStore, problems: &'a dyn ProblemStore, config: &'a ArchiveConfig) -> Self {
        Self {
            objects,
            problems,
            config,
        }
    }

    /// Fetch a problem the caller may export (admin or owner)
    pub fn load(&self, caller: &Caller, problem_id: i64) -> Result<ProblemRecord> {
        let problem = self
            .problems
            .get(problem_id)?
            .ok_or_else(|| ArchiveError::NotFound(format!("problem {}", problem_id)))?;
        if !caller.is_admin && problem.owner != caller.username {
            return Err(ArchiveError::Permission(format!(
                "{} may not export problem {}",
                caller.username, problem_id
            )));
        }
        Ok(problem)
    }

    /// Export one problem into a fresh temporary container
    pub fn export(
        &self,
        caller: &Caller,
        problem_id: i64,
        filter: Option<&ComponentFilter>,
    ) -> Result<ExportedArchive<Manifest>> {
        info!(problem_id, user = %caller.username, "exporting problem");
        let problem = self.load(caller, problem_id)?;

        let (file, mut zip) = new_container()?;
        let manifest = self.write_problem(&mut zip, caller, &problem, "", filter)?;
        zip.finish()?;

        info!(
            problem_id,
            content_hash = %manifest.problem_content_hash,
            files = manifest.files.len(),
            "exported problem"
        );
        Ok(ExportedArchive::new(file, manifest))
    }

    /// Write one problem under `prefix` into an open container.
    ///
    /// Permission is not checked here; see [`load`](Self::load).
    pub fn write_problem<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        caller: &Caller,
        problem: &ProblemRecord,
        prefix: &str,
        filter: Option<&ComponentFilter>,
    ) -> Result<Manifest> {
        let prefix = normalize_prefix(prefix);
        let plan = ExportPlan::build(problem, filter)?;
        let chunk_size = self.config.chunk_size;

        let mut files: BTreeMap<String, FileEntry> = BTreeMap::new();
        let mut component_files: BTreeMap<ComponentId, Vec<FileRecord>> = BTreeMap::new();
        let mut record = |id: ComponentId, path: &str, sha256: String, size: u64, written: bool| {
            if written {
                files.insert(
                    path.to_string(),
                    FileEntry {
                        sha256: sha256.clone(),
                        size,
                        role: Some(id),
                    },
                );
            }
            component_files.entry(id).or_default().push(FileRecord {
                path: path.to_string(),
                sha256,
                size,
            });
        };

        let meta_bytes = pretty(&plan.meta)?;
        zip.start_file(format!("{}{}", prefix, META_FILE), entry_options())?;
        zip.write_all(&meta_bytes)?;
        record(ComponentId::CoreMeta, META_FILE, digest(&meta_bytes), meta_bytes.len() as u64, true);

        let mut reader = self.objects.get(&plan.testcase_key)?;
        zip.start_file(format!("{}{}", prefix, TESTCASE_FILE), entry_options())?;
        let (sha256, size) = copy_with_digest(&mut reader, &mut *zip, chunk_size)?;
        record(ComponentId::CoreTestcase, TESTCASE_FILE, sha256, size, true);

        for source in &plan.sources {
            let mut reader = self.objects.get(&source.source_key)?;
            let included = plan.included.contains(&source.id);
            let (sha256, size) = if included {
                zip.start_file(format!("{}{}", prefix, source.archive_path), entry_options())?;
                copy_with_digest(&mut reader, &mut *zip, chunk_size)?
            } else {
                debug!(component = %source.id, "hashing excluded component");
                stream_digest(&mut reader, chunk_size)?
            };
            record(source.id, &source.archive_path, sha256, size, included);
        }

        let mut manifest =
            Manifest::new(caller.username.clone()).with_source_system(self.config.source_system.clone());
        manifest.redactions = plan.redactions.clone();
        manifest.files = files;

        let mut included_hashes = BTreeMap::new();
        for (id, records) in &component_files {
            let hash = match id {
                ComponentId::CoreMeta => meta_hash(&plan.meta)?,
                _ => component_hash(*id, records)?,
            };
            let included = plan.included.contains(id);
            let paths = if included {
                records.iter().map(|r| r.path.clone()).collect()
            } else {
                Vec::new()
            };
            if included {
                included_hashes.insert(*id, hash.clone());
            }
            manifest.components.insert(
                *id,
                ComponentEntry {
                    included,
                    hash,
                    files: paths,
                },
            );
        }
        manifest.problem_content_hash = problem_content_hash(&included_hashes)?;

        zip.start_file(format!("{}{}", prefix, MANIFEST_FILE), entry_options())?;
        zip.write_all(&pretty(&manifest)?)?;

        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::mock::{sample_meta, MockBackend, SeedProblem};
    use std::io::Read;
    use zip::ZipArchive;

    fn entry_names(bytes: Vec<u8>) -> Vec<String> {
        let archive = ZipArchive::new(io::Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("problem_3"), "problem_3/");
        assert_eq!(normalize_prefix("problem_3/"), "problem_3/");
    }

    #[test]
    fn test_export_basic_problem() {
        let backend = MockBackend::new();
        let id = backend.seed(SeedProblem::new("teacher", sample_meta()));
        let config = ArchiveConfig::default();
        let writer = ArchiveWriter::new(backend.objects.as_ref(), backend.problems.as_ref(), &config);

        let exported = writer.export(&Caller::new("teacher"), id, None).unwrap();
        let manifest = exported.manifest();
        assert_eq!(manifest.exported_by, "teacher");
        assert!(manifest.files.contains_key("meta.json"));
        assert!(manifest.files.contains_key("testcase.zip"));
        assert!(manifest.problem_content_hash.starts_with("sha256:"));
        assert_eq!(manifest.redactions, vec!["config.aiVTuberApiKeys".to_string()]);

        let names = entry_names(exported.to_bytes().unwrap());
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"manifest.json".to_string()));
    }

    #[test]
    fn test_meta_json_is_redacted_and_stripped() {
        let backend = MockBackend::new();
        let id = backend.seed(SeedProblem::new("teacher", sample_meta()));
        let config = ArchiveConfig::default();
        let writer = ArchiveWriter::new(backend.objects.as_ref(), backend.problems.as_ref(), &config);

        let exported = writer.export(&Caller::admin("root"), id, None).unwrap();
        let mut archive = ZipArchive::new(exported.open().unwrap()).unwrap();
        let mut text = String::new();
        archive.by_name("meta.json").unwrap().read_to_string(&mut text).unwrap();

        assert!(text.ends_with("}\n"));
        let meta: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(meta["config"].get("aiVTuberApiKeys").is_none());
        assert!(meta.get("ACUser").is_none());
        assert!(meta.get("submitter").is_none());
        assert!(meta["testCase"].get("submissionMode").is_none());
        assert_eq!(meta["config"]["aiMaxToken"], 500);
        assert_eq!(meta["config"]["testMode"], false);
    }

    #[test]
    fn test_export_requires_owner_or_admin() {
        let backend = MockBackend::new();
        let id = backend.seed(SeedProblem::new("teacher", sample_meta()));
        let config = ArchiveConfig::default();
        let writer = ArchiveWriter::new(backend.objects.as_ref(), backend.problems.as_ref(), &config);

        let err = writer.export(&Caller::new("student"), id, None).unwrap_err();
        assert!(matches!(err, ArchiveError::Permission(_)));

        let err = writer.export(&Caller::admin("root"), 999, None).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }

    #[test]
    fn test_excluded_asset_hashed_not_written() {
        let backend = MockBackend::new();
        let mut meta = sample_meta();
        meta.config_mut().resource_data = Some(true);
        let id = backend.seed(
            SeedProblem::new("teacher", meta).with_asset("resource_data", "data.zip", b"resource bytes".to_vec()),
        );
        let config = ArchiveConfig::default();
        let writer = ArchiveWriter::new(backend.objects.as_ref(), backend.problems.as_ref(), &config);

        // resourceData is on, so the filter is widened to keep it
        let filter = ComponentFilter::core_only();
        let exported = writer.export(&Caller::admin("root"), id, Some(&filter)).unwrap();
        assert!(exported.manifest().components[&ComponentId::ResourceData].included);

        let mut meta = sample_meta();
        meta.config_mut().resource_data = Some(false);
        meta.config_mut().asset_paths = None;
        let id = backend.seed(
            SeedProblem::new("teacher", meta).with_asset("resource_data", "data.zip", b"resource bytes".to_vec()),
        );
        let filter = ComponentFilter::core_only();
        let exported = writer.export(&Caller::admin("root"), id, Some(&filter)).unwrap();
        let entry = &exported.manifest().components[&ComponentId::ResourceData];
        assert!(!entry.included);
        assert!(entry.files.is_empty());
        assert!(entry.hash.starts_with("sha256:"));
        assert!(!exported.manifest().files.contains_key("assets/resource_data/data.zip"));

        let names = entry_names(exported.to_bytes().unwrap());
        assert!(!names.iter().any(|n| n.starts_with("assets/")));
    }

    #[test]
    fn test_missing_test_case_rejected() {
        let backend = MockBackend::new();
        let id = backend.seed(SeedProblem::new("teacher", sample_meta()).without_testcase());
        let config = ArchiveConfig::default();
        let writer = ArchiveWriter::new(backend.objects.as_ref(), backend.problems.as_ref(), &config);

        let err = writer.export(&Caller::admin("root"), id, None).unwrap_err();
        assert!(matches!(err.as_validation(), Some(ValidationError::TestCaseNotReady)));
    }

    #[test]
    fn test_write_problem_under_prefix() {
        let backend = MockBackend::new();
        let id = backend.seed(SeedProblem::new("teacher", sample_meta()));
        let config = ArchiveConfig::default();
        let writer = ArchiveWriter::new(backend.objects.as_ref(), backend.problems.as_ref(), &config);
        let problem = backend.problems.record(id).unwrap();

        let mut zip = ZipWriter::new(io::Cursor::new(Vec::new()));
        writer
            .write_problem(&mut zip, &Caller::admin("root"), &problem, "problem_1", None)
            .unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let names = entry_names(bytes);
        assert!(names.contains(&"problem_1/meta.json".to_string()));
        assert!(names.contains(&"problem_1/manifest.json".to_string()));
    }
}
