//! Archive manifest (manifest.json)
//!
//! The manifest is the archive's self-description: every file with its
//! digest, size and owning component, per-component hashes, and the overall
//! `problemContentHash` binding the included components together.

mod batch;
mod hash;

pub use batch::{BatchEntry, BatchFailure, BatchManifest};
pub use hash::{component_hash, meta_hash, problem_content_hash, FileRecord};

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::component::ComponentId;
use crate::error::ValidationError;

/// Format version written into every manifest
pub const FORMAT_VERSION: &str = "1.1";

/// Source system label written when none is configured
pub const SOURCE_SYSTEM: &str = "Normal-OJ";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const META_FILE: &str = "meta.json";
pub const TESTCASE_FILE: &str = "testcase.zip";

/// Entry of the flat `files` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub sha256: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ComponentId>,
}

/// Entry of the `components` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    #[serde(default = "default_included")]
    pub included: bool,
    pub hash: String,
    /// Archive-relative paths; empty when the component was not materialized
    #[serde(default)]
    pub files: Vec<String>,
}

fn default_included() -> bool {
    true
}

/// Single-problem manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Manifest {
    pub format_version: String,
    pub exported_at: String,
    pub exported_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,
    pub problem_content_hash: String,
    pub components: BTreeMap<ComponentId, ComponentEntry>,
    pub files: BTreeMap<String, FileEntry>,
    pub redactions: Vec<String>,
}

impl Manifest {
    /// Start an empty manifest stamped with the current time
    pub fn new(exported_by: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            exported_at: export_timestamp(),
            exported_by: exported_by.into(),
            source_system: Some(SOURCE_SYSTEM.to_string()),
            ..Default::default()
        }
    }

    pub fn with_source_system(mut self, source_system: impl Into<String>) -> Self {
        self.source_system = Some(source_system.into());
        self
    }

    /// Whether the manifest lacks a component table (older exporters)
    pub fn is_legacy(&self) -> bool {
        self.components.is_empty()
    }

    /// Components the archive claims to carry.
    ///
    /// Taken from the component table, or inferred from file roles when the
    /// table is absent. Core components are always members.
    pub fn included_components(&self) -> BTreeSet<ComponentId> {
        let mut included: BTreeSet<ComponentId> = if self.is_legacy() {
            self.files.values().filter_map(|entry| entry.role).collect()
        } else {
            self.components
                .iter()
                .filter(|(_, entry)| entry.included)
                .map(|(id, _)| *id)
                .collect()
        };
        included.extend(ComponentId::CORE);
        included
    }

    /// Files whose role survives `included`. Files without a role are kept.
    pub fn files_for(&self, included: &BTreeSet<ComponentId>) -> BTreeMap<String, FileEntry> {
        self.files
            .iter()
            .filter(|(_, entry)| entry.role.map_or(true, |role| included.contains(&role)))
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect()
    }

    /// Recompute the content hash from the component table and compare.
    ///
    /// Legacy manifests carry no component hashes and are skipped.
    pub fn verify_content_hash(&self) -> Result<(), ValidationError> {
        if self.is_legacy() {
            return Ok(());
        }
        let hashes: BTreeMap<ComponentId, String> = self
            .components
            .iter()
            .filter(|(_, entry)| entry.included)
            .map(|(id, entry)| (*id, entry.hash.clone()))
            .collect();
        let actual = problem_content_hash(&hashes).map_err(|e| ValidationError::MalformedJson {
            file: MANIFEST_FILE.to_string(),
            reason: e.to_string(),
        })?;
        if actual != self.problem_content_hash {
            return Err(ValidationError::ContentHashMismatch {
                expected: self.problem_content_hash.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// UTC timestamp with second precision, e.g. `2024-05-01T12:00:00Z`
pub fn export_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Manifest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_new_manifest_header() {
        let manifest = Manifest::new("teacher");
        assert_eq!(manifest.format_version, "1.1");
        assert_eq!(manifest.exported_by, "teacher");
        assert_eq!(manifest.source_system.as_deref(), Some("Normal-OJ"));
        assert_eq!(manifest.exported_at.len(), "2024-05-01T12:00:00Z".len());
        assert!(manifest.exported_at.ends_with('Z'));
    }

    #[test]
    fn test_camel_case_wire_format() {
        let mut manifest = Manifest::new("admin");
        manifest.problem_content_hash = "sha256:00".to_string();
        manifest.files.insert(
            "testcase.zip".to_string(),
            FileEntry {
                sha256: "ab".to_string(),
                size: 2,
                role: Some(ComponentId::CoreTestcase),
            },
        );
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["formatVersion"], "1.1");
        assert_eq!(value["problemContentHash"], "sha256:00");
        assert_eq!(value["files"]["testcase.zip"]["role"], "core.testcase");
        assert!(value.get("sourceSystem").is_some());
    }

    #[test]
    fn test_included_from_component_table() {
        let manifest = parse(json!({
            "components": {
                "core.meta": {"included": true, "hash": "sha256:a", "files": ["meta.json"]},
                "assets.checker": {"included": true, "hash": "sha256:b", "files": ["assets/checker/c.py"]},
                "assets.makefile": {"included": false, "hash": "sha256:c", "files": []}
            }
        }));
        let included = manifest.included_components();
        assert!(included.contains(&ComponentId::Checker));
        assert!(!included.contains(&ComponentId::Makefile));
        assert!(included.contains(&ComponentId::CoreTestcase));
    }

    #[test]
    fn test_included_inferred_from_roles() {
        let manifest = parse(json!({
            "files": {
                "meta.json": {"sha256": "a", "size": 1, "role": "core.meta"},
                "assets/trial/ac.py": {"sha256": "b", "size": 1, "role": "trial.ac_code"},
                "notes.txt": {"sha256": "c", "size": 1}
            }
        }));
        assert!(manifest.is_legacy());
        let included = manifest.included_components();
        assert_eq!(
            included,
            [ComponentId::CoreMeta, ComponentId::CoreTestcase, ComponentId::TrialAcCode]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result: Result<Manifest, _> = serde_json::from_value(json!({
            "files": {"x": {"sha256": "a", "size": 1, "role": "assets.bogus"}}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_files_for_filters_by_role() {
        let manifest = parse(json!({
            "files": {
                "meta.json": {"sha256": "a", "size": 1, "role": "core.meta"},
                "assets/checker/c.py": {"sha256": "b", "size": 1, "role": "assets.checker"},
                "readme": {"sha256": "c", "size": 1}
            }
        }));
        let included: BTreeSet<_> = ComponentId::CORE.into_iter().collect();
        let files = manifest.files_for(&included);
        assert!(files.contains_key("meta.json"));
        assert!(files.contains_key("readme"));
        assert!(!files.contains_key("assets/checker/c.py"));
    }

    #[test]
    fn test_verify_content_hash() {
        let mut hashes = BTreeMap::new();
        hashes.insert(ComponentId::CoreMeta, "sha256:aa".to_string());
        hashes.insert(ComponentId::CoreTestcase, "sha256:bb".to_string());

        let mut manifest = Manifest::new("admin");
        for (id, hash) in &hashes {
            manifest.components.insert(
                *id,
                ComponentEntry {
                    included: true,
                    hash: hash.clone(),
                    files: vec![],
                },
            );
        }
        // an excluded component does not take part
        manifest.components.insert(
            ComponentId::Checker,
            ComponentEntry {
                included: false,
                hash: "sha256:cc".to_string(),
                files: vec![],
            },
        );
        manifest.problem_content_hash = problem_content_hash(&hashes).unwrap();
        assert!(manifest.verify_content_hash().is_ok());

        manifest.problem_content_hash = "sha256:bogus".to_string();
        assert!(matches!(
            manifest.verify_content_hash(),
            Err(ValidationError::ContentHashMismatch { .. })
        ));
    }
}
