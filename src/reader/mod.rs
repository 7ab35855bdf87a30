//! Archive reader
//!
//! Imports one problem from a gated [`Container`] into a target course.
//! Files are extracted into a private staging directory and verified before
//! any record is created; after that every side effect is tracked by an
//! [`ImportLedger`] and undone if a later step fails.

mod container;
mod ledger;
mod validate;
mod verify;

pub use container::Container;
pub use ledger::ImportLedger;
pub use validate::{check_entries, check_entry_count, safe_entry_name, EntryInfo};
pub use verify::{verify_archive, VerifiedProblem, VerifyReport};

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::component::{
    apply_component_filter, ensure_feature_alignment, ensure_required_present, ComponentFilter, ComponentId,
};
use crate::config::ArchiveConfig;
use crate::error::{Result, ValidationError};
use crate::manifest::{FileEntry, Manifest, TESTCASE_FILE};
use crate::meta::ProblemMeta;
use crate::store::{AssetUpdate, NewProblem, ObjectStore, ProblemStore};
use crate::writer::normalize_prefix;

/// Status given to imported problems when neither caller nor archive sets one
pub const DEFAULT_STATUS: i64 = 1;

/// Language code recorded for a trial reference solution
pub fn ac_code_language(filename: &str) -> Option<u8> {
    match extension(filename)?.as_str() {
        "c" => Some(0),
        "cpp" => Some(1),
        "py" => Some(2),
        _ => None,
    }
}

/// `teacherLang` value derived from a teacher solution's extension
pub fn teacher_language(filename: &str) -> Option<&'static str> {
    match extension(filename)?.as_str() {
        "c" => Some("c"),
        "cpp" => Some("cpp"),
        "py" => Some("py"),
        _ => None,
    }
}

fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Course and owner an import lands in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTarget {
    pub course: String,
    pub owner: String,
}

impl ImportTarget {
    pub fn new(course: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            owner: owner.into(),
        }
    }
}

/// Per-call import knobs
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Replaces the archive's `status`
    pub status_override: Option<i64>,
    pub filter: Option<ComponentFilter>,
    /// Folder of the problem inside a batch container
    pub prefix: String,
}

impl ImportOptions {
    pub fn with_status(mut self, status: i64) -> Self {
        self.status_override = Some(status);
        self
    }

    pub fn with_filter(mut self, filter: ComponentFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// A problem created by an import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedProblem {
    pub course: String,
    pub problem_id: i64,
    pub problem_name: String,
    /// Id in the exporting system, known for batch entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_id: Option<i64>,
}

/// Metadata and file selection decided before anything is extracted
#[derive(Debug, Clone)]
struct ImportPlan {
    meta: ProblemMeta,
    included: BTreeSet<ComponentId>,
    files: BTreeMap<String, FileEntry>,
    /// Listed files of excluded components, checked but never staged
    verify_only: BTreeMap<String, FileEntry>,
}

impl ImportPlan {
    fn build(manifest: &Manifest, mut meta: ProblemMeta, filter: Option<&ComponentFilter>) -> Result<Self> {
        meta.strip_submission_mode();
        meta.redact();
        meta.adopt_legacy_test_case();
        meta.strip_derived_asset_keys();

        let missing = meta.missing_required_fields();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing).into());
        }

        let mut included = manifest.included_components();
        if let Some(filter) = filter {
            included.retain(|id| filter.contains(*id));
            apply_component_filter(&mut meta, filter);
        }

        let has_network_assets = included.iter().any(|id| id.is_network());
        meta.config_mut().normalize_network_access(has_network_assets);
        ensure_feature_alignment(&meta, &included)?;
        ensure_required_present(&meta, &included)?;

        let files = manifest.files_for(&included);
        let verify_only = match filter {
            Some(_) => BTreeMap::new(),
            None => manifest
                .files
                .iter()
                .filter(|(path, _)| !files.contains_key(*path))
                .map(|(path, entry)| (path.clone(), entry.clone()))
                .collect(),
        };
        Ok(Self {
            meta,
            included,
            files,
            verify_only,
        })
    }

    /// Archive-relative path of each included asset named by `assetPaths`
    fn asset_files(&self) -> Vec<(ComponentId, String)> {
        let Some(paths) = self.meta.asset_paths() else {
            return Vec::new();
        };
        ComponentId::assets()
            .filter(|id| self.included.contains(id))
            .filter_map(|id| {
                let rel_path = paths.get(id.asset_key()?)?;
                Some((id, rel_path.clone()))
            })
            .collect()
    }
}

/// Imports problems from containers into the stores
pub struct ArchiveReader<'a> {
    objects: &'a dyn ObjectStore,
    problems: &'a dyn ProblemStore,
    config: &'a ArchiveConfig,
}

impl<'a> ArchiveReader<'a> {
    pub fn new(objects: &'a dyn ObjectStore, problems: &'a dyn ProblemStore, config: &'a ArchiveConfig) -> Self {
        Self {
            objects,
            problems,
            config,
        }
    }

    /// Import the problem stored under `options.prefix` into `target`.
    ///
    /// On failure no record and no uploaded object remains.
    pub fn import<R: Read + Seek>(
        &self,
        container: &mut Container<R>,
        target: &ImportTarget,
        options: &ImportOptions,
    ) -> Result<ImportedProblem> {
        let prefix = normalize_prefix(&options.prefix);
        let (manifest, meta) = container.load_problem(&prefix)?;
        let plan = ImportPlan::build(&manifest, meta, options.filter.as_ref())?;

        for (rel_path, entry) in &plan.verify_only {
            container.extract_verified(&prefix, rel_path, entry, &mut io::sink(), self.config.chunk_size)?;
        }

        let staging = tempfile::Builder::new().prefix("problem-import-").tempdir()?;
        debug!(path = %staging.path().display(), files = plan.files.len(), "staging archive files");
        let staged = self.stage(container, &prefix, &plan.files, staging.path())?;

        let testcase = staged
            .get(TESTCASE_FILE)
            .ok_or_else(|| ValidationError::MissingEntry(TESTCASE_FILE.to_string()))?;
        ZipArchive::new(File::open(testcase)?).map_err(|e| ValidationError::InvalidTestCase(e.to_string()))?;

        let mut assets = Vec::new();
        for (id, rel_path) in plan.asset_files() {
            let local = staged
                .get(rel_path.as_str())
                .ok_or_else(|| ValidationError::MissingFile(rel_path.clone()))?;
            let filename = Path::new(&rel_path)
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| ValidationError::UnsafeEntry(rel_path.clone()))?
                .to_string();
            assets.push((id, local.clone(), filename));
        }

        let problem_name = plan.meta.problem_name.clone().unwrap_or_default();
        let status = options.status_override.or(plan.meta.status).unwrap_or(DEFAULT_STATUS);
        let mut meta = plan.meta;
        let mut asset_paths = retained_asset_paths(&meta);
        meta.config_mut().asset_paths = Some(asset_paths.clone());

        let mut ledger = ImportLedger::new(self.objects, self.problems);
        let problem_id = self.problems.create(NewProblem {
            owner: target.owner.clone(),
            courses: vec![target.course.clone()],
            status,
            meta,
        })?;
        ledger.record_problem(problem_id);

        let mut update = AssetUpdate::default();
        let testcase_key = format!("problem/{}/{}", problem_id, TESTCASE_FILE);
        self.upload(&mut ledger, testcase, &testcase_key)?;
        update.testcase_path = Some(testcase_key);

        for (id, local, filename) in assets {
            let key = destination(problem_id, id, &filename);
            self.upload(&mut ledger, &local, &key)?;
            match id {
                ComponentId::TrialPublicTestdata => update.public_testdata_path = Some(key),
                ComponentId::TrialAcCode => {
                    update.ac_code_language = ac_code_language(&filename);
                    update.ac_code_path = Some(key);
                }
                _ => {
                    if id == ComponentId::TeacherFile && !asset_paths.contains_key("teacherLang") {
                        if let Some(lang) = teacher_language(&filename) {
                            asset_paths.insert("teacherLang".to_string(), lang.to_string());
                        }
                    }
                    if let Some(asset_key) = id.asset_key() {
                        asset_paths.insert(asset_key.to_string(), key);
                    }
                }
            }
        }

        update.asset_paths = asset_paths;
        self.problems.update_assets(problem_id, update)?;
        let uploaded = ledger.uploaded().len();
        ledger.commit();

        info!(
            problem_id,
            course = %target.course,
            owner = %target.owner,
            objects = uploaded,
            "imported problem"
        );
        Ok(ImportedProblem {
            course: target.course.clone(),
            problem_id,
            problem_name,
            original_id: None,
        })
    }

    /// Extract and verify every selected file into `root`
    fn stage<R: Read + Seek>(
        &self,
        container: &mut Container<R>,
        prefix: &str,
        files: &BTreeMap<String, FileEntry>,
        root: &Path,
    ) -> Result<BTreeMap<String, PathBuf>> {
        let mut staged = BTreeMap::new();
        for (rel_path, entry) in files {
            if !safe_entry_name(rel_path) {
                return Err(ValidationError::UnsafeEntry(rel_path.clone()).into());
            }
            let local = root.join(rel_path);
            if let Some(parent) = local.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&local)?;
            container.extract_verified(prefix, rel_path, entry, &mut file, self.config.chunk_size)?;
            staged.insert(rel_path.clone(), local);
        }
        Ok(staged)
    }

    fn upload(&self, ledger: &mut ImportLedger<'_>, local: &Path, key: &str) -> Result<()> {
        let mut file = File::open(local)?;
        let len = file.metadata()?.len();
        ledger.record_object(key);
        self.objects.put(key, &mut file, len)?;
        debug!(%key, bytes = len, "uploaded object");
        Ok(())
    }
}

/// Object key an imported asset is stored under
pub fn destination(problem_id: i64, id: ComponentId, filename: &str) -> String {
    match id {
        ComponentId::TrialPublicTestdata => {
            format!("problem/{}/public_testdata/public_testdata.zip", problem_id)
        }
        _ => match id.asset_key() {
            Some(asset_key) => format!("problem/{}/{}/{}", problem_id, asset_key, filename),
            None => format!("problem/{}/{}", problem_id, filename),
        },
    }
}

/// Non-asset entries of `assetPaths`, such as `teacherLang`
fn retained_asset_paths(meta: &ProblemMeta) -> BTreeMap<String, String> {
    meta.asset_paths()
        .map(|paths| {
            paths
                .iter()
                .filter(|(key, _)| ComponentId::from_asset_key(key).is_none())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}
