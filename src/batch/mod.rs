//! Batch orchestrator
//!
//! [`ProblemArchiveService`] is the entry point for callers: it owns the
//! store handles and the effective limits, resolves import targets, and runs
//! the writer or reader once per problem and course. Per-item failures are
//! collected instead of aborting the call.

use std::collections::BTreeSet;
use std::io::{Read, Seek, Write};
use std::sync::Arc;

use noj_canon::pretty;
use serde::Serialize;
use tracing::{info, warn};

use crate::component::ComponentFilter;
use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, ErrorKind, Result, ValidationError};
use crate::manifest::{BatchEntry, BatchManifest, Manifest, MANIFEST_FILE};
use crate::reader::{ArchiveReader, Container, ImportOptions, ImportTarget, ImportedProblem};
use crate::store::{Caller, CourseDirectory, ObjectStore, ProblemStore};
use crate::writer::{entry_options, new_container, ArchiveWriter, ExportedArchive};

/// Reason recorded for entries that carry no folder
pub const MISSING_FOLDER: &str = "missing folder";

/// Reason recorded for problems the caller may not export
pub const PERMISSION_DENIED: &str = "permission denied";

/// An import that did not happen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_id: Option<i64>,
    pub course: String,
    pub kind: ErrorKind,
    pub reason: String,
}

impl ImportFailure {
    fn from_error(original_id: Option<i64>, course: &str, err: &ArchiveError) -> Self {
        Self {
            original_id,
            course: course.to_string(),
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

/// Result of an import call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub imported: Vec<ImportedProblem>,
    pub failed: Vec<ImportFailure>,
}

impl ImportOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Parameters of an import call
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub courses: Vec<String>,
    pub status_override: Option<i64>,
    pub filter: Option<ComponentFilter>,
}

impl ImportRequest {
    pub fn new<I, S>(courses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            courses: courses.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: i64) -> Self {
        self.status_override = Some(status);
        self
    }

    pub fn with_filter(mut self, filter: ComponentFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    fn options(&self, prefix: &str) -> ImportOptions {
        ImportOptions {
            status_override: self.status_override,
            filter: self.filter.clone(),
            prefix: prefix.to_string(),
        }
    }
}

/// Trim course names and drop blanks and duplicates, keeping first-seen order
pub fn normalize_course_names<S: AsRef<str>>(names: &[S]) -> std::result::Result<Vec<String>, ValidationError> {
    let mut seen = BTreeSet::new();
    let names: Vec<String> = names
        .iter()
        .map(|name| name.as_ref().trim())
        .filter(|name| !name.is_empty() && seen.insert(name.to_string()))
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(ValidationError::NoTargetCourses);
    }
    Ok(names)
}

/// Export and import of problem archives against a set of stores
pub struct ProblemArchiveService {
    objects: Arc<dyn ObjectStore>,
    problems: Arc<dyn ProblemStore>,
    courses: Arc<dyn CourseDirectory>,
    config: ArchiveConfig,
}

impl ProblemArchiveService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        problems: Arc<dyn ProblemStore>,
        courses: Arc<dyn CourseDirectory>,
    ) -> Self {
        Self {
            objects,
            problems,
            courses,
            config: ArchiveConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ArchiveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    fn writer(&self) -> ArchiveWriter<'_> {
        ArchiveWriter::new(self.objects.as_ref(), self.problems.as_ref(), &self.config)
    }

    fn reader(&self) -> ArchiveReader<'_> {
        ArchiveReader::new(self.objects.as_ref(), self.problems.as_ref(), &self.config)
    }

    /// Export a single problem
    pub fn export(
        &self,
        caller: &Caller,
        problem_id: i64,
        filter: Option<&ComponentFilter>,
    ) -> Result<ExportedArchive<Manifest>> {
        self.writer().export(caller, problem_id, filter)
    }

    /// Export several problems into one container, each under `problem_<id>/`.
    ///
    /// A problem that cannot be exported is listed under `failed` in the
    /// root manifest; the rest are still written.
    pub fn export_batch(
        &self,
        caller: &Caller,
        problem_ids: &[i64],
        filter: Option<&ComponentFilter>,
    ) -> Result<ExportedArchive<BatchManifest>> {
        info!(user = %caller.username, count = problem_ids.len(), "exporting problem batch");
        let writer = self.writer();
        let (file, mut zip) = new_container()?;
        let mut batch = BatchManifest::new(caller.username.clone());

        let mut seen = BTreeSet::new();
        for &problem_id in problem_ids.iter().filter(|id| seen.insert(**id)) {
            let folder = format!("problem_{}", problem_id);
            let result = writer.load(caller, problem_id).and_then(|problem| {
                let manifest = writer.write_problem(&mut zip, caller, &problem, &folder, filter)?;
                Ok((problem, manifest))
            });

            match result {
                Ok((problem, manifest)) => batch.push_problem(BatchEntry {
                    folder: Some(folder),
                    problem_content_hash: Some(manifest.problem_content_hash),
                    original_id: Some(problem_id),
                    name: problem.meta.problem_name.clone(),
                }),
                Err(err) => {
                    warn!(problem_id, kind = %err.kind(), %err, "problem left out of batch export");
                    let reason = match err {
                        ArchiveError::Permission(_) => PERMISSION_DENIED.to_string(),
                        other => other.to_string(),
                    };
                    batch.push_failure(problem_id, reason);
                }
            }
        }

        zip.start_file(MANIFEST_FILE, entry_options())?;
        zip.write_all(&pretty(&batch)?)?;
        zip.finish()?;

        info!(
            exported = batch.problem_count,
            failed = batch.failed.len(),
            "exported problem batch"
        );
        Ok(ExportedArchive::new(file, batch))
    }

    /// Resolve course names to import targets.
    ///
    /// Every course must exist, be modifiable by the caller, and have a
    /// teacher, who becomes the owner of imported problems.
    pub fn resolve_targets<S: AsRef<str>>(&self, caller: &Caller, names: &[S]) -> Result<Vec<ImportTarget>> {
        let names = normalize_course_names(names)?;
        let mut targets = Vec::with_capacity(names.len());
        for name in names {
            let course = self
                .courses
                .course(&name)?
                .ok_or_else(|| ArchiveError::NotFound(format!("course {}", name)))?;
            if !self.courses.can_modify(caller, &course) {
                return Err(ArchiveError::Permission(format!(
                    "{} may not add problems to course {}",
                    caller.username, name
                )));
            }
            let owner = course
                .teacher
                .clone()
                .ok_or_else(|| ArchiveError::NotFound(format!("teacher of course {}", name)))?;
            targets.push(ImportTarget::new(name, owner));
        }
        Ok(targets)
    }

    /// Import a single-problem container once per requested course
    pub fn import<R: Read + Seek>(&self, caller: &Caller, source: R, request: &ImportRequest) -> Result<ImportOutcome> {
        let targets = self.resolve_targets(caller, request.courses.as_slice())?;
        let mut container = Container::open(source, &self.config.limits)?;
        info!(user = %caller.username, targets = targets.len(), "importing problem");

        let reader = self.reader();
        let options = request.options("");
        let mut outcome = ImportOutcome::default();
        for target in &targets {
            match reader.import(&mut container, target, &options) {
                Ok(imported) => outcome.imported.push(imported),
                Err(err) => {
                    warn!(course = %target.course, kind = %err.kind(), %err, "import failed");
                    outcome.failed.push(ImportFailure::from_error(None, &target.course, &err));
                }
            }
        }
        Ok(outcome)
    }

    /// Import every problem of a batch container into every requested course
    pub fn import_batch<R: Read + Seek>(
        &self,
        caller: &Caller,
        source: R,
        request: &ImportRequest,
    ) -> Result<ImportOutcome> {
        let targets = self.resolve_targets(caller, request.courses.as_slice())?;
        let mut container = Container::open(source, &self.config.limits)?;
        let root = container.root_manifest()?;
        let batch: BatchManifest = serde_json::from_value(root).map_err(|e| ValidationError::MalformedJson {
            file: MANIFEST_FILE.to_string(),
            reason: e.to_string(),
        })?;
        info!(
            user = %caller.username,
            problems = batch.problems.len(),
            targets = targets.len(),
            "importing problem batch"
        );

        let reader = self.reader();
        let mut outcome = ImportOutcome::default();
        for entry in &batch.problems {
            let Some(folder) = entry.folder.as_deref().filter(|f| !f.trim().is_empty()) else {
                warn!(original_id = ?entry.original_id, "batch entry has no folder");
                for target in &targets {
                    outcome.failed.push(ImportFailure {
                        original_id: entry.original_id,
                        course: target.course.clone(),
                        kind: ErrorKind::Validation,
                        reason: MISSING_FOLDER.to_string(),
                    });
                }
                continue;
            };

            let options = request.options(folder);
            for target in &targets {
                match reader.import(&mut container, target, &options) {
                    Ok(mut imported) => {
                        imported.original_id = entry.original_id;
                        outcome.imported.push(imported);
                    }
                    Err(err) => {
                        warn!(
                            original_id = ?entry.original_id,
                            folder,
                            course = %target.course,
                            kind = %err.kind(),
                            %err,
                            "batch item import failed"
                        );
                        outcome
                            .failed
                            .push(ImportFailure::from_error(entry.original_id, &target.course, &err));
                    }
                }
            }
        }

        info!(
            imported = outcome.imported.len(),
            failed = outcome.failed.len(),
            "imported problem batch"
        );
        Ok(outcome)
    }
}
