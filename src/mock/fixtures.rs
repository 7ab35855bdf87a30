//! Sample problems and a wired-up in-memory backend

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::sync::Arc;

use serde_json::json;
use zip::result::ZipResult;
use zip::ZipWriter;

use super::stores::{MemoryCourseDirectory, MemoryObjectStore, MemoryProblemStore};
use crate::batch::ProblemArchiveService;
use crate::component::ComponentId;
use crate::config::ArchiveConfig;
use crate::meta::{ExecutionMode, Pipeline, ProblemConfig, ProblemMeta, TestCaseInfo};
use crate::reader::ac_code_language;
use crate::store::ProblemRecord;
use crate::writer::entry_options;

/// Build an in-memory zip from `(name, bytes)` pairs
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, entry_options())?;
        zip.write_all(data)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// A small, valid graded test-case archive
pub fn testcase_zip() -> ZipResult<Vec<u8>> {
    zip_bytes(&[("0000.in", b"1 2\n"), ("0000.out", b"3\n")])
}

/// Metadata carrying every field an import requires
pub fn sample_meta() -> ProblemMeta {
    let test_case = TestCaseInfo {
        submission_mode: Some(json!(0)),
        extra: [
            ("language".to_string(), json!(2)),
            ("fillInTemplate".to_string(), json!("")),
            (
                "tasks".to_string(),
                json!([{"caseCount": 1, "taskScore": 100, "memoryLimit": 65536, "timeLimit": 1000}]),
            ),
        ]
        .into_iter()
        .collect(),
    };

    ProblemMeta {
        courses: Some(vec!["Public".to_string()]),
        problem_name: Some("A + B".to_string()),
        description: Some(json!({
            "description": "Add two numbers.\r\n",
            "input": "Two integers a and b.",
            "output": "Their sum.",
            "hint": "",
            "sampleInput": ["1 2"],
            "sampleOutput": ["3"]
        })),
        tags: Some(vec!["math".to_string()]),
        test_case: Some(test_case),
        allowed_language: Some(7),
        can_view_stdout: Some(true),
        quota: Some(-1),
        status: Some(1),
        problem_type: Some(0),
        default_code: Some(String::new()),
        config: Some(ProblemConfig {
            trial_mode: Some(false),
            ai_vtuber_api_keys: Some(json!(["key-1"])),
            ..Default::default()
        }),
        pipeline: Some(Pipeline {
            custom_checker: Some(false),
            execution_mode: Some(ExecutionMode::General),
            ..Default::default()
        }),
        ac_user: Some(json!(["alice"])),
        submitter: Some(json!(3)),
        ..Default::default()
    }
}

/// Builder for a problem seeded into a [`MockBackend`]
#[derive(Debug, Clone)]
pub struct SeedProblem {
    owner: String,
    meta: ProblemMeta,
    testcase: Option<Vec<u8>>,
    assets: Vec<(String, String, Vec<u8>)>,
}

impl SeedProblem {
    pub fn new(owner: impl Into<String>, meta: ProblemMeta) -> Self {
        Self {
            owner: owner.into(),
            meta,
            testcase: testcase_zip().ok(),
            assets: Vec::new(),
        }
    }

    pub fn with_testcase(mut self, bytes: Vec<u8>) -> Self {
        self.testcase = Some(bytes);
        self
    }

    pub fn without_testcase(mut self) -> Self {
        self.testcase = None;
        self
    }

    /// Attach an asset under its `assetPaths` key
    pub fn with_asset(mut self, asset_key: &str, filename: &str, bytes: Vec<u8>) -> Self {
        self.assets.push((asset_key.to_string(), filename.to_string(), bytes));
        self
    }
}

/// In-memory stores shared with a service under test
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    pub objects: Arc<MemoryObjectStore>,
    pub problems: Arc<MemoryProblemStore>,
    pub courses: Arc<MemoryCourseDirectory>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(&self) -> ProblemArchiveService {
        self.service_with_config(ArchiveConfig::default())
    }

    pub fn service_with_config(&self, config: ArchiveConfig) -> ProblemArchiveService {
        ProblemArchiveService::new(self.objects.clone(), self.problems.clone(), self.courses.clone())
            .with_config(config)
    }

    /// Store a problem and its blobs, returning the new id
    pub fn seed(&self, seed: SeedProblem) -> i64 {
        let base = format!("seed/{}", uuid::Uuid::new_v4());

        let mut record = ProblemRecord {
            id: 0,
            owner: seed.owner,
            courses: seed.meta.courses.clone().unwrap_or_default(),
            meta: seed.meta,
            testcase_path: None,
            public_testdata_path: None,
            ac_code_path: None,
            ac_code_language: None,
        };

        if let Some(bytes) = seed.testcase {
            let key = format!("{}/testcase.zip", base);
            self.objects.insert(key.clone(), bytes);
            record.testcase_path = Some(key);
        }

        let mut asset_paths: BTreeMap<String, String> = record.meta.asset_paths().cloned().unwrap_or_default();
        for (asset_key, filename, bytes) in seed.assets {
            let key = format!("{}/{}/{}", base, asset_key, filename);
            self.objects.insert(key.clone(), bytes);
            match ComponentId::from_asset_key(&asset_key) {
                Some(ComponentId::TrialPublicTestdata) => record.public_testdata_path = Some(key),
                Some(ComponentId::TrialAcCode) => {
                    record.ac_code_language = ac_code_language(&filename);
                    record.ac_code_path = Some(key);
                }
                _ => {
                    asset_paths.insert(asset_key, key);
                }
            }
        }
        if !asset_paths.is_empty() {
            record.meta.config_mut().asset_paths = Some(asset_paths);
        }

        self.problems.insert(record)
    }
}
