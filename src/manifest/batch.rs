//! Root manifest of a multi-problem archive

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{export_timestamp, FORMAT_VERSION};

/// One exported problem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchEntry {
    /// Folder prefix inside the archive, e.g. `problem_12`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A problem that could not be exported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub problem_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchManifest {
    pub format_version: String,
    pub exported_at: String,
    pub exported_by: String,
    pub problem_count: usize,
    pub problems: Vec<BatchEntry>,
    pub failed: Vec<BatchFailure>,
}

impl BatchManifest {
    pub fn new(exported_by: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            exported_at: export_timestamp(),
            exported_by: exported_by.into(),
            ..Default::default()
        }
    }

    pub fn push_problem(&mut self, entry: BatchEntry) {
        self.problems.push(entry);
        self.problem_count = self.problems.len();
    }

    pub fn push_failure(&mut self, problem_id: i64, reason: impl Into<String>) {
        self.failed.push(BatchFailure {
            problem_id,
            reason: reason.into(),
        });
    }

    /// Whether a parsed root manifest describes a batch rather than one problem
    pub fn looks_like_batch(value: &Value) -> bool {
        value.get("problems").map_or(false, Value::is_array)
    }
}
