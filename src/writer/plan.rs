//! Export snapshot and component selection
//!
//! Everything that can reject an export is decided here, before the writer
//! touches the container.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::component::{
    apply_component_filter, ensure_feature_alignment, ensure_required_present, required_components,
    ComponentFilter, ComponentId,
};
use crate::error::{Result, ValidationError};
use crate::meta::ProblemMeta;
use crate::store::ProblemRecord;

/// Where an asset comes from and where it lands in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSource {
    pub id: ComponentId,
    /// Object-store key of the source
    pub source_key: String,
    /// Archive-relative path, `<archive_directory>/<filename>`
    pub archive_path: String,
}

/// Metadata snapshot plus the decided component layout
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub meta: ProblemMeta,
    pub redactions: Vec<String>,
    pub testcase_key: String,
    /// Every asset that exists, included or not
    pub sources: Vec<AssetSource>,
    /// Components materialized in the archive (core included)
    pub included: BTreeSet<ComponentId>,
}

impl ExportPlan {
    pub fn build(problem: &ProblemRecord, filter: Option<&ComponentFilter>) -> Result<Self> {
        let mut meta = problem.meta.clone();
        meta.apply_export_defaults();
        meta.strip_transient();
        meta.owner = None;
        let redactions = meta.redact();
        meta.strip_submission_mode();
        meta.strip_derived_asset_keys();

        let sources = resolve_sources(problem, &meta)?;
        meta.config_mut().asset_paths = Some(rewrite_asset_paths(&meta, &sources));

        let present: BTreeSet<ComponentId> = sources.iter().map(|s| s.id).collect();
        let has_network_assets = present.iter().any(|id| id.is_network());
        meta.config_mut().normalize_network_access(has_network_assets);

        let filter = filter.cloned().map(|mut filter| {
            apply_component_filter(&mut meta, &filter);
            filter.extend(required_components(&meta));
            filter
        });

        let mut available = present.clone();
        available.extend(ComponentId::CORE);
        ensure_required_present(&meta, &available)?;

        let mut included: BTreeSet<ComponentId> = present
            .into_iter()
            .filter(|id| filter.as_ref().map_or(true, |f| f.contains(*id)))
            .collect();
        ensure_feature_alignment(&meta, &included)?;
        included.extend(ComponentId::CORE);

        let testcase_key = match problem.testcase_path.as_deref() {
            Some(key) if problem.is_test_case_ready() => key.to_string(),
            _ => return Err(ValidationError::TestCaseNotReady.into()),
        };

        Ok(Self {
            meta,
            redactions,
            testcase_key,
            sources,
            included,
        })
    }
}

/// Resolve each asset component to its object-store key.
///
/// Trial assets prefer the record's dedicated pointers over `assetPaths`.
fn resolve_sources(problem: &ProblemRecord, meta: &ProblemMeta) -> Result<Vec<AssetSource>> {
    let asset_paths = meta.asset_paths();
    let from_paths = |key: &str| asset_paths.and_then(|paths| paths.get(key)).cloned();

    let mut sources = Vec::new();
    for id in ComponentId::assets() {
        let Some(asset_key) = id.asset_key() else {
            continue;
        };
        let source_key = match id {
            ComponentId::TrialPublicTestdata => problem.public_testdata_path.clone(),
            ComponentId::TrialAcCode => problem.ac_code_path.clone(),
            _ => None,
        }
        .filter(|key| !key.is_empty())
        .or_else(|| from_paths(asset_key));

        let Some(source_key) = source_key.filter(|key| !key.is_empty()) else {
            continue;
        };
        let filename = Path::new(&source_key)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ValidationError::UnsafeEntry(source_key.clone()))?
            .to_string();

        sources.push(AssetSource {
            id,
            archive_path: format!("{}/{}", id.archive_directory(), filename),
            source_key,
        });
    }
    Ok(sources)
}

/// `assetPaths` pointing into the archive; non-asset keys are carried over
fn rewrite_asset_paths(meta: &ProblemMeta, sources: &[AssetSource]) -> BTreeMap<String, String> {
    let mut paths: BTreeMap<String, String> = meta
        .asset_paths()
        .map(|paths| {
            paths
                .iter()
                .filter(|(key, _)| ComponentId::from_asset_key(key).is_none())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    for source in sources {
        if let Some(key) = source.id.asset_key() {
            paths.insert(key.to_string(), source.archive_path.clone());
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(meta: serde_json::Value) -> ProblemRecord {
        ProblemRecord {
            id: 1,
            owner: "teacher".to_string(),
            courses: vec!["Public".to_string()],
            meta: serde_json::from_value(meta).unwrap(),
            testcase_path: Some("problem/1/testcase.zip".to_string()),
            public_testdata_path: None,
            ac_code_path: None,
            ac_code_language: None,
        }
    }

    #[test]
    fn test_asset_paths_rewritten() {
        let problem = record(json!({
            "config": {"assetPaths": {
                "checker": "problem/1/checker/check.py",
                "scoring_config": "problem/1/scoring/config.json",
                "teacherLang": "cpp"
            }},
            "pipeline": {"customChecker": true}
        }));
        let plan = ExportPlan::build(&problem, None).unwrap();

        let paths = plan.meta.asset_paths().unwrap();
        assert_eq!(paths.get("checker").map(String::as_str), Some("assets/checker/check.py"));
        assert_eq!(paths.get("teacherLang").map(String::as_str), Some("cpp"));
        assert!(!paths.contains_key("scoring_config"));
        assert_eq!(plan.sources.len(), 1);
        assert_eq!(plan.sources[0].source_key, "problem/1/checker/check.py");
        assert!(plan.included.contains(&ComponentId::Checker));
    }

    #[test]
    fn test_trial_pointers_preferred() {
        let mut problem = record(json!({
            "config": {"trialMode": true, "assetPaths": {"ac_code": "old/ac.c"}}
        }));
        problem.public_testdata_path = Some("problem/1/public_testdata/public_testdata.zip".to_string());
        problem.ac_code_path = Some("problem/1/ac_code/solution.py".to_string());

        let plan = ExportPlan::build(&problem, None).unwrap();
        let ac = plan.sources.iter().find(|s| s.id == ComponentId::TrialAcCode).unwrap();
        assert_eq!(ac.source_key, "problem/1/ac_code/solution.py");
        assert_eq!(ac.archive_path, "assets/trial/solution.py");
        assert!(plan.sources.iter().any(|s| s.archive_path == "assets/trial/public_testdata.zip"));
    }

    #[test]
    fn test_missing_required_asset() {
        let problem = record(json!({"pipeline": {"customChecker": true}}));
        let err = ExportPlan::build(&problem, None).unwrap_err();
        assert_eq!(err.to_string(), "missing required components: assets.checker");
    }

    #[test]
    fn test_feature_misalignment() {
        let problem = record(json!({
            "config": {"assetPaths": {"checker": "problem/1/checker/check.py"}},
            "pipeline": {"customChecker": false}
        }));
        let err = ExportPlan::build(&problem, None).unwrap_err();
        assert!(matches!(err.as_validation(), Some(ValidationError::FeatureMismatch(ids)) if ids == &vec![ComponentId::Checker]));
    }

    #[test]
    fn test_network_assets_enable_network_access() {
        let problem = record(json!({
            "config": {"assetPaths": {"network_dockerfile": "problem/1/network_dockerfile/Dockerfile"}}
        }));
        let plan = ExportPlan::build(&problem, None).unwrap();
        assert_eq!(plan.meta.config.as_ref().unwrap().network_access_enabled, Some(true));
        assert!(plan.included.contains(&ComponentId::NetworkDockerfile));
    }

    #[test]
    fn test_filter_strips_settings_and_forces_required() {
        let problem = record(json!({
            "config": {
                "aiVTuber": true,
                "assetPaths": {
                    "checker": "problem/1/checker/check.py",
                    "makefile": "problem/1/makefile/Makefile"
                }
            },
            "pipeline": {"customChecker": true, "executionMode": "general"}
        }));
        let filter = ComponentFilter::parse(["settings.ai_ta"]).unwrap();
        let plan = ExportPlan::build(&problem, Some(&filter));

        // makefile exists but executionMode is general; excluded so no mismatch
        let plan = plan.unwrap();
        assert!(plan.included.contains(&ComponentId::Checker));
        assert!(!plan.included.contains(&ComponentId::Makefile));
        assert_eq!(plan.meta.config.as_ref().unwrap().ai_vtuber, Some(true));
        assert!(plan.meta.pipeline.as_ref().unwrap().allow_read.is_none());
    }

    #[test]
    fn test_redactions_recorded() {
        let problem = record(json!({
            "config": {"aiVTuberApiKeys": ["k"], "aiChecker": {"enabled": true, "apiKeyId": "id"}}
        }));
        let plan = ExportPlan::build(&problem, None).unwrap();
        assert_eq!(
            plan.redactions,
            vec!["config.aiVTuberApiKeys".to_string(), "config.aiChecker.apiKeyId".to_string()]
        );
        let config = plan.meta.config.as_ref().unwrap();
        assert!(config.ai_vtuber_api_keys.is_none());
        assert!(config.ai_checker.as_ref().unwrap().api_key_id.is_none());
    }
}
