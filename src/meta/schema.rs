//! Problem metadata schema (`meta.json`)
//!
//! Every field is optional so that archives from older or foreign exporters
//! parse, and missing required fields can be reported by name. Unknown keys
//! are kept in the flattened `extra` maps and round-trip untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Top-level problem metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProblemMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courses: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_name: Option<String>,

    /// Statement (description, input, output, hint, samples)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_case: Option<TestCaseInfo>,

    /// Legacy spelling of `testCase`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_case_info: Option<TestCaseInfo>,

    /// Language bitmask
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_language: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_view_stdout: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ProblemConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Pipeline>,

    #[serde(rename = "ACUser", skip_serializing_if = "Option::is_none")]
    pub ac_user: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitter: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_count: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_submission_count: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Test-case layout (tasks, case counts, memory/time limits)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestCaseInfo {
    /// Submission-time field, never exported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_mode: Option<Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// How the judged program is driven.
///
/// Modes this crate does not know are carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionMode {
    General,
    FunctionOnly,
    Interactive,
    Other(String),
}

impl From<String> for ExecutionMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "general" => ExecutionMode::General,
            "functionOnly" => ExecutionMode::FunctionOnly,
            "interactive" => ExecutionMode::Interactive,
            _ => ExecutionMode::Other(value),
        }
    }
}

impl From<ExecutionMode> for String {
    fn from(mode: ExecutionMode) -> Self {
        match mode {
            ExecutionMode::General => "general".to_string(),
            ExecutionMode::FunctionOnly => "functionOnly".to_string(),
            ExecutionMode::Interactive => "interactive".to_string(),
            ExecutionMode::Other(value) => value,
        }
    }
}

/// Scoring script switch: either a plain flag or `{custom: bool, ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoringScript {
    Flag(bool),
    Config(ScoringScriptConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringScriptConfig {
    pub custom: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ScoringScript {
    pub fn enabled(&self) -> bool {
        match self {
            ScoringScript::Flag(flag) => *flag,
            ScoringScript::Config(cfg) => cfg.custom,
        }
    }
}

/// AI checker settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiChecker {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Secret reference, redacted on export
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Problem-level configuration (`meta.config`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProblemConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_mode: Option<bool>,

    /// Legacy name of `trialMode`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_mode: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_result_visible: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_result_downloadable: Option<bool>,

    #[serde(rename = "aiVTuber", skip_serializing_if = "Option::is_none")]
    pub ai_vtuber: Option<bool>,

    #[serde(rename = "aiVTuberMode", skip_serializing_if = "Option::is_none")]
    pub ai_vtuber_mode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_max_token: Option<Number>,

    #[serde(rename = "aiVTuberApiKeys", skip_serializing_if = "Option::is_none")]
    pub ai_vtuber_api_keys: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_checker: Option<AiChecker>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_data: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_data_teacher: Option<bool>,

    #[serde(rename = "maxStudentZipSizeMB", skip_serializing_if = "Option::is_none")]
    pub max_student_zip_size_mb: Option<Number>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expose_testcase: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_collection: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_access_enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_access_restriction: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_read: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_write: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_analysis: Option<Value>,

    /// Legacy mirror of `pipeline.customChecker`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_checker: Option<bool>,

    /// Legacy mirror of `pipeline.executionMode`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,

    /// Legacy mirror of `pipeline.scoringScript`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_script: Option<ScoringScript>,

    /// Asset pointers keyed by asset type, plus a few non-asset keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_paths: Option<BTreeMap<String, String>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Grading pipeline configuration (`meta.pipeline`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pipeline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_read: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_write: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_checker: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_first: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_script: Option<ScoringScript>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_analysis: Option<Map<String, Value>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Fields an imported `meta.json` must carry
pub const REQUIRED_FIELDS: &[&str] = &[
    "problemName",
    "description",
    "allowedLanguage",
    "quota",
    "type",
    "status",
    "testCase",
    "canViewStdout",
    "defaultCode",
    "config",
    "pipeline",
];

impl ProblemMeta {
    /// Names of required fields absent from this metadata
    pub fn missing_required_fields(&self) -> Vec<String> {
        let present = [
            self.problem_name.is_some(),
            self.description.is_some(),
            self.allowed_language.is_some(),
            self.quota.is_some(),
            self.problem_type.is_some(),
            self.status.is_some(),
            self.test_case.is_some(),
            self.can_view_stdout.is_some(),
            self.default_code.is_some(),
            self.config.is_some(),
            self.pipeline.is_some(),
        ];
        REQUIRED_FIELDS
            .iter()
            .zip(present)
            .filter(|(_, is_present)| !is_present)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Mutable config, created empty if absent
    pub fn config_mut(&mut self) -> &mut ProblemConfig {
        self.config.get_or_insert_with(ProblemConfig::default)
    }

    /// Mutable pipeline, created empty if absent
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        self.pipeline.get_or_insert_with(Pipeline::default)
    }

    /// Whether a custom checker is configured (pipeline or legacy config)
    pub fn custom_checker_enabled(&self) -> bool {
        let pipeline = self.pipeline.as_ref().and_then(|p| p.custom_checker);
        let config = self.config.as_ref().and_then(|c| c.custom_checker);
        pipeline.unwrap_or(false) || config.unwrap_or(false)
    }

    /// Execution mode, pipeline first then legacy config
    pub fn execution_mode(&self) -> Option<&ExecutionMode> {
        self.pipeline
            .as_ref()
            .and_then(|p| p.execution_mode.as_ref())
            .or_else(|| self.config.as_ref().and_then(|c| c.execution_mode.as_ref()))
    }

    /// Whether a custom scoring script is configured
    pub fn scoring_script_enabled(&self) -> bool {
        self.pipeline
            .as_ref()
            .and_then(|p| p.scoring_script.as_ref())
            .or_else(|| self.config.as_ref().and_then(|c| c.scoring_script.as_ref()))
            .map(ScoringScript::enabled)
            .unwrap_or(false)
    }

    /// Trial mode, falling back to the legacy `testMode` flag
    pub fn trial_mode_enabled(&self) -> bool {
        self.config
            .as_ref()
            .and_then(|c| c.trial_mode.or(c.test_mode))
            .unwrap_or(false)
    }

    pub fn resource_data_enabled(&self) -> bool {
        self.config.as_ref().and_then(|c| c.resource_data).unwrap_or(false)
    }

    pub fn resource_data_teacher_enabled(&self) -> bool {
        self.config
            .as_ref()
            .and_then(|c| c.resource_data_teacher)
            .unwrap_or(false)
    }

    pub fn network_access_enabled(&self) -> bool {
        self.config
            .as_ref()
            .and_then(|c| c.network_access_enabled)
            .unwrap_or(false)
    }

    /// Borrow the asset path table, if any
    pub fn asset_paths(&self) -> Option<&BTreeMap<String, String>> {
        self.config.as_ref().and_then(|c| c.asset_paths.as_ref())
    }
}
