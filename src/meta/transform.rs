//! Metadata transformations applied around export and import
//!
//! Redaction, transient-field stripping, export defaults, the hash view used
//! for content identity, and network-access normalization.

use serde_json::{json, Map, Number, Value};

use super::schema::{
    ExecutionMode, Pipeline, ProblemConfig, ProblemMeta, ScoringScript,
    ScoringScriptConfig,
};

/// Labels of secret fields removed before export
pub const REDACTED_PATHS: &[&str] = &["config.aiVTuberApiKeys", "config.aiChecker.apiKeyId"];

/// Top-level keys excluded from the `core.meta` content hash
pub const HASH_EXCLUDED_FIELDS: &[&str] = &[
    "problemName",
    "courses",
    "status",
    "tags",
    "ACUser",
    "submitter",
    "submitCount",
    "trialSubmissionCount",
    "exportedAt",
    "exportedBy",
    "owner",
];

/// `assetPaths` key derived from the scoring script, never carried over
pub const DERIVED_ASSET_KEYS: &[&str] = &["scoring_config"];

impl ProblemMeta {
    /// Remove secret fields, returning the labels of those actually present.
    pub fn redact(&mut self) -> Vec<String> {
        let mut redactions = Vec::new();
        if let Some(config) = self.config.as_mut() {
            if config.ai_vtuber_api_keys.take().is_some() {
                redactions.push(REDACTED_PATHS[0].to_string());
            }
            if let Some(checker) = config.ai_checker.as_mut() {
                if checker.api_key_id.take().is_some() {
                    redactions.push(REDACTED_PATHS[1].to_string());
                }
            }
        }
        redactions
    }

    /// Drop submission counters and solver lists
    pub fn strip_transient(&mut self) {
        self.ac_user = None;
        self.submitter = None;
        self.submit_count = None;
        self.trial_submission_count = None;
    }

    /// Drop the submission-time `submissionMode` from the test-case layout
    pub fn strip_submission_mode(&mut self) {
        for info in [self.test_case.as_mut(), self.test_case_info.as_mut()]
            .into_iter()
            .flatten()
        {
            info.submission_mode = None;
        }
    }

    /// Accept legacy `testCaseInfo` in place of `testCase`
    pub fn adopt_legacy_test_case(&mut self) {
        if self.test_case.is_none() {
            self.test_case = self.test_case_info.take();
        }
    }

    /// Drop derived asset keys that must never round-trip
    pub fn strip_derived_asset_keys(&mut self) {
        if let Some(paths) = self.config.as_mut().and_then(|c| c.asset_paths.as_mut()) {
            for key in DERIVED_ASSET_KEYS {
                paths.remove(*key);
            }
        }
    }

    /// Copy of this metadata with volatile and secret fields removed.
    ///
    /// Cosmetic edits (renames, retagging, status flips, course moves) leave
    /// the resulting hash unchanged.
    pub fn hash_view(&self) -> ProblemMeta {
        let mut view = self.clone();
        view.problem_name = None;
        view.courses = None;
        view.status = None;
        view.tags = None;
        view.owner = None;
        view.strip_transient();
        for key in HASH_EXCLUDED_FIELDS {
            view.extra.remove(*key);
        }
        view.strip_submission_mode();
        view.redact();
        view
    }

    /// Fill in the defaults every exported `config`/`pipeline` carries.
    ///
    /// Also mirrors the trial switch into the legacy `testMode` flag.
    pub fn apply_export_defaults(&mut self) {
        let trial = self.trial_mode_enabled();
        let config = self.config_mut();
        config.trial_mode = Some(trial);
        config.test_mode = Some(trial);
        config.apply_export_defaults();
        let legacy = (
            config.custom_checker,
            config.execution_mode.clone(),
            config.scoring_script.clone(),
        );

        // legacy config values seed the pipeline before its defaults apply
        let pipeline = self.pipeline_mut();
        if pipeline.custom_checker.is_none() {
            pipeline.custom_checker = legacy.0;
        }
        if pipeline.execution_mode.is_none() {
            pipeline.execution_mode = legacy.1;
        }
        if pipeline.scoring_script.is_none() {
            pipeline.scoring_script = legacy.2;
        }
        pipeline.apply_export_defaults();
    }
}

impl ProblemConfig {
    fn apply_export_defaults(&mut self) {
        self.trial_result_visible.get_or_insert(false);
        self.trial_result_downloadable.get_or_insert(false);
        self.ai_vtuber.get_or_insert(false);
        self.ai_vtuber_mode
            .get_or_insert_with(|| "gemini-2.5-flash-lite".to_string());
        self.ai_max_token.get_or_insert_with(|| Number::from(500u64));
        self.accepted_format.get_or_insert_with(|| "code".to_string());
        self.compilation.get_or_insert(false);
        self.resource_data.get_or_insert(false);
        self.resource_data_teacher.get_or_insert(false);
        self.max_student_zip_size_mb.get_or_insert_with(|| Number::from(50u64));
        self.expose_testcase.get_or_insert(false);
        self.artifact_collection.get_or_insert_with(|| json!([]));
        if let Some(checker) = self.ai_checker.as_mut() {
            checker.enabled.get_or_insert(false);
        }
    }

    /// Infer and default the network-access switch.
    ///
    /// An unset switch is turned on when the restriction lists external
    /// hosts or sidecars, carries legacy enable flags, or network assets are
    /// part of the archive. When on, the restriction skeleton is filled in.
    pub fn normalize_network_access(&mut self, has_network_assets: bool) {
        let restriction = self.network_access_restriction.as_ref().and_then(Value::as_object);

        let has_external = restriction
            .and_then(|r| r.get("external"))
            .and_then(Value::as_object)
            .map(|ext| truthy(ext.get("ip")) || truthy(ext.get("url")))
            .unwrap_or(false);
        let has_sidecars = restriction
            .and_then(|r| r.get("sidecars"))
            .and_then(Value::as_array)
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        let has_legacy = restriction
            .map(|r| {
                ["enabled", "firewallExtranet", "connectWithLocal"]
                    .iter()
                    .any(|key| truthy(r.get(*key)))
            })
            .unwrap_or(false);

        let enabled = self
            .network_access_enabled
            .unwrap_or(has_external || has_sidecars || has_legacy || has_network_assets);
        self.network_access_enabled = Some(enabled);
        if !enabled {
            return;
        }

        match self.network_access_restriction.as_mut() {
            Some(Value::Object(nar)) => {
                nar.entry("sidecars").or_insert_with(|| json!([]));
                match nar.get_mut("external") {
                    Some(Value::Object(external)) => {
                        external.entry("model").or_insert_with(|| json!("White"));
                        external.entry("ip").or_insert_with(|| json!([]));
                        external.entry("url").or_insert_with(|| json!([]));
                    }
                    _ => {
                        nar.insert("external".to_string(), default_external());
                    }
                }
            }
            _ => {
                self.network_access_restriction = Some(json!({
                    "sidecars": [],
                    "external": default_external(),
                }));
            }
        }
    }
}

impl Pipeline {
    fn apply_export_defaults(&mut self) {
        self.allow_read.get_or_insert(false);
        self.allow_write.get_or_insert(false);
        self.execution_mode.get_or_insert(ExecutionMode::General);
        self.custom_checker.get_or_insert(false);
        self.teacher_first.get_or_insert(false);
        self.scoring_script
            .get_or_insert_with(|| ScoringScript::Config(ScoringScriptConfig::default()));

        let static_analysis = self.static_analysis.get_or_insert_with(Map::new);
        match static_analysis.get_mut("libraryRestrictions") {
            Some(Value::Object(libs)) => {
                libs.entry("enabled").or_insert(Value::Bool(false));
                for mode in ["whitelist", "blacklist"] {
                    let lists = libs.entry(mode).or_insert_with(empty_library_lists);
                    if let Value::Object(lists) = lists {
                        for key in LIBRARY_LIST_KEYS {
                            lists.entry(*key).or_insert_with(|| json!([]));
                        }
                    }
                }
            }
            _ => {
                static_analysis.insert(
                    "libraryRestrictions".to_string(),
                    json!({
                        "enabled": false,
                        "whitelist": empty_library_lists(),
                        "blacklist": empty_library_lists(),
                    }),
                );
            }
        }
    }
}

const LIBRARY_LIST_KEYS: &[&str] = &["syntax", "imports", "headers", "functions"];

fn empty_library_lists() -> Value {
    let lists: Map<String, Value> = LIBRARY_LIST_KEYS
        .iter()
        .map(|key| (key.to_string(), json!([])))
        .collect();
    Value::Object(lists)
}

fn default_external() -> Value {
    json!({"model": "White", "ip": [], "url": []})
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_from(value: Value) -> ProblemMeta {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_redact_records_present_paths_only() {
        let mut meta = meta_from(json!({
            "config": {"aiVTuberApiKeys": ["k1"], "aiChecker": {"enabled": true}}
        }));
        let redactions = meta.redact();

        assert_eq!(redactions, vec!["config.aiVTuberApiKeys".to_string()]);
        assert!(meta.config.as_ref().unwrap().ai_vtuber_api_keys.is_none());
        assert_eq!(meta.config.as_ref().unwrap().ai_checker.as_ref().unwrap().enabled, Some(true));
    }

    #[test]
    fn test_redact_nested_api_key() {
        let mut meta = meta_from(json!({"config": {"aiChecker": {"apiKeyId": "abc", "model": "m"}}}));
        let redactions = meta.redact();

        assert_eq!(redactions, vec!["config.aiChecker.apiKeyId".to_string()]);
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value["config"]["aiChecker"].get("apiKeyId").is_none());
        assert_eq!(value["config"]["aiChecker"]["model"], "m");
    }

    #[test]
    fn test_strip_transient_and_submission_mode() {
        let mut meta = meta_from(json!({
            "ACUser": 3, "submitter": 5, "submitCount": 9, "trialSubmissionCount": 1,
            "testCase": {"submissionMode": 1, "tasks": []}
        }));
        meta.strip_transient();
        meta.strip_submission_mode();

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value, json!({"testCase": {"tasks": []}}));
    }

    #[test]
    fn test_hash_view_ignores_cosmetic_fields() {
        let a = meta_from(json!({
            "problemName": "one", "tags": ["x"], "status": 0, "courses": ["A"],
            "quota": 10, "exportedBy": "alice"
        }));
        let b = meta_from(json!({
            "problemName": "two", "tags": [], "status": 1, "courses": ["B"],
            "quota": 10
        }));

        assert_eq!(a.hash_view(), b.hash_view());
        assert_eq!(a.hash_view().quota, Some(10));
    }

    #[test]
    fn test_export_defaults() {
        let mut meta = meta_from(json!({"config": {"testMode": true}, "pipeline": {}}));
        meta.apply_export_defaults();

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["config"]["trialMode"], true);
        assert_eq!(value["config"]["testMode"], true);
        assert_eq!(value["config"]["aiMaxToken"], 500);
        assert_eq!(value["config"]["maxStudentZipSizeMB"], 50);
        assert_eq!(value["pipeline"]["executionMode"], "general");
        assert_eq!(value["pipeline"]["scoringScript"], json!({"custom": false}));
        assert_eq!(
            value["pipeline"]["staticAnalysis"]["libraryRestrictions"]["whitelist"]["headers"],
            json!([])
        );
    }

    #[test]
    fn test_export_defaults_fill_partial_library_lists() {
        let mut meta = meta_from(json!({
            "pipeline": {"staticAnalysis": {"libraryRestrictions": {"whitelist": {"imports": ["os"]}}}}
        }));
        meta.apply_export_defaults();

        let libs = &serde_json::to_value(&meta).unwrap()["pipeline"]["staticAnalysis"]["libraryRestrictions"];
        assert_eq!(libs["enabled"], false);
        assert_eq!(libs["whitelist"]["imports"], json!(["os"]));
        assert_eq!(libs["whitelist"]["syntax"], json!([]));
        assert_eq!(libs["blacklist"]["functions"], json!([]));
    }

    #[test]
    fn test_network_inferred_from_sidecars() {
        let mut config: ProblemConfig = serde_json::from_value(json!({
            "networkAccessRestriction": {"sidecars": [{"image": "redis"}]}
        }))
        .unwrap();
        config.normalize_network_access(false);

        assert_eq!(config.network_access_enabled, Some(true));
        let nar = config.network_access_restriction.unwrap();
        assert_eq!(nar["external"], json!({"model": "White", "ip": [], "url": []}));
    }

    #[test]
    fn test_network_inferred_from_assets() {
        let mut config = ProblemConfig::default();
        config.normalize_network_access(true);

        assert_eq!(config.network_access_enabled, Some(true));
        assert_eq!(
            config.network_access_restriction,
            Some(json!({"sidecars": [], "external": {"model": "White", "ip": [], "url": []}}))
        );
    }

    #[test]
    fn test_network_explicit_false_wins() {
        let mut config: ProblemConfig = serde_json::from_value(json!({
            "networkAccessEnabled": false,
            "networkAccessRestriction": {"external": {"ip": ["1.1.1.1"]}}
        }))
        .unwrap();
        config.normalize_network_access(true);

        assert_eq!(config.network_access_enabled, Some(false));
    }

    #[test]
    fn test_network_disabled_by_default() {
        let mut config = ProblemConfig::default();
        config.normalize_network_access(false);

        assert_eq!(config.network_access_enabled, Some(false));
        assert!(config.network_access_restriction.is_none());
    }

    #[test]
    fn test_export_defaults_keep_legacy_config_switches() {
        let mut meta = meta_from(json!({
            "config": {"executionMode": "functionOnly", "customChecker": true}
        }));
        meta.apply_export_defaults();

        let pipeline = meta.pipeline.as_ref().unwrap();
        assert_eq!(pipeline.execution_mode, Some(ExecutionMode::FunctionOnly));
        assert_eq!(pipeline.custom_checker, Some(true));
    }
}
