//! Archive component catalogue and feature rules
//!
//! A component is a named unit of the archive (metadata, test data, or one
//! optional asset kind). The catalogue is closed: every component has a
//! fixed archive directory, an optional `assetPaths` key, and the feature
//! flag that requires or permits it.

mod filter;

pub use filter::{apply_component_filter, ComponentFilter, SettingsGroup};

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::meta::{ExecutionMode, ProblemMeta};

/// Identifier of an archive component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentId {
    #[serde(rename = "core.meta")]
    CoreMeta,
    #[serde(rename = "core.testcase")]
    CoreTestcase,
    #[serde(rename = "assets.checker")]
    Checker,
    #[serde(rename = "assets.makefile")]
    Makefile,
    #[serde(rename = "assets.teacher_file")]
    TeacherFile,
    #[serde(rename = "assets.scoring_script")]
    ScoringScript,
    #[serde(rename = "assets.local_service")]
    LocalService,
    #[serde(rename = "assets.resource_data")]
    ResourceData,
    #[serde(rename = "assets.resource_data_teacher")]
    ResourceDataTeacher,
    #[serde(rename = "assets.network_dockerfile")]
    NetworkDockerfile,
    #[serde(rename = "trial.public_testdata")]
    TrialPublicTestdata,
    #[serde(rename = "trial.ac_code")]
    TrialAcCode,
}

/// Feature switch a component is tied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Always,
    CustomChecker,
    FunctionOnly,
    Interactive,
    ScoringScript,
    TrialMode,
    ResourceData,
    ResourceDataTeacher,
    NetworkAccess,
}

impl Feature {
    /// Whether `meta` switches this feature on
    pub fn enabled(self, meta: &ProblemMeta) -> bool {
        match self {
            Feature::Always => true,
            Feature::CustomChecker => meta.custom_checker_enabled(),
            Feature::FunctionOnly => meta.execution_mode() == Some(&ExecutionMode::FunctionOnly),
            Feature::Interactive => meta.execution_mode() == Some(&ExecutionMode::Interactive),
            Feature::ScoringScript => meta.scoring_script_enabled(),
            Feature::TrialMode => meta.trial_mode_enabled(),
            Feature::ResourceData => meta.resource_data_enabled(),
            Feature::ResourceDataTeacher => meta.resource_data_teacher_enabled(),
            Feature::NetworkAccess => meta.network_access_enabled(),
        }
    }
}

/// Static description of a component
#[derive(Debug)]
pub struct ComponentSpec {
    pub id: ComponentId,
    pub key: &'static str,
    /// Directory inside the archive ("" for root-level core files)
    pub archive_directory: &'static str,
    /// Key in `config.assetPaths`, for asset components
    pub asset_key: Option<&'static str>,
    pub feature: Feature,
    /// Whether an enabled feature makes the component mandatory
    /// (network components are only permitted, never required)
    pub required_when_enabled: bool,
}

const fn spec(
    id: ComponentId,
    key: &'static str,
    archive_directory: &'static str,
    asset_key: Option<&'static str>,
    feature: Feature,
    required_when_enabled: bool,
) -> ComponentSpec {
    ComponentSpec {
        id,
        key,
        archive_directory,
        asset_key,
        feature,
        required_when_enabled,
    }
}

/// Component table, in declaration order of [`ComponentId`]
static COMPONENTS: [ComponentSpec; 12] = [
    spec(ComponentId::CoreMeta, "core.meta", "", None, Feature::Always, true),
    spec(ComponentId::CoreTestcase, "core.testcase", "", None, Feature::Always, true),
    spec(ComponentId::Checker, "assets.checker", "assets/checker", Some("checker"), Feature::CustomChecker, true),
    spec(ComponentId::Makefile, "assets.makefile", "assets/makefile", Some("makefile"), Feature::FunctionOnly, true),
    spec(ComponentId::TeacherFile, "assets.teacher_file", "assets/teacher", Some("teacher_file"), Feature::Interactive, true),
    spec(ComponentId::ScoringScript, "assets.scoring_script", "assets/scoring", Some("scoring_script"), Feature::ScoringScript, true),
    spec(ComponentId::LocalService, "assets.local_service", "assets/local_service", Some("local_service"), Feature::NetworkAccess, false),
    spec(ComponentId::ResourceData, "assets.resource_data", "assets/resource_data", Some("resource_data"), Feature::ResourceData, true),
    spec(ComponentId::ResourceDataTeacher, "assets.resource_data_teacher", "assets/resource_data_teacher", Some("resource_data_teacher"), Feature::ResourceDataTeacher, true),
    spec(ComponentId::NetworkDockerfile, "assets.network_dockerfile", "assets/network_dockerfile", Some("network_dockerfile"), Feature::NetworkAccess, false),
    spec(ComponentId::TrialPublicTestdata, "trial.public_testdata", "assets/trial", Some("public_testdata"), Feature::TrialMode, true),
    spec(ComponentId::TrialAcCode, "trial.ac_code", "assets/trial", Some("ac_code"), Feature::TrialMode, true),
];

impl ComponentId {
    /// Every component, in catalogue order
    pub const ALL: [ComponentId; 12] = [
        ComponentId::CoreMeta,
        ComponentId::CoreTestcase,
        ComponentId::Checker,
        ComponentId::Makefile,
        ComponentId::TeacherFile,
        ComponentId::ScoringScript,
        ComponentId::LocalService,
        ComponentId::ResourceData,
        ComponentId::ResourceDataTeacher,
        ComponentId::NetworkDockerfile,
        ComponentId::TrialPublicTestdata,
        ComponentId::TrialAcCode,
    ];

    /// The two components every archive carries
    pub const CORE: [ComponentId; 2] = [ComponentId::CoreMeta, ComponentId::CoreTestcase];

    pub fn spec(self) -> &'static ComponentSpec {
        &COMPONENTS[self as usize]
    }

    /// Dotted key, e.g. `assets.checker`
    pub fn as_str(self) -> &'static str {
        self.spec().key
    }

    pub fn archive_directory(self) -> &'static str {
        self.spec().archive_directory
    }

    pub fn asset_key(self) -> Option<&'static str> {
        self.spec().asset_key
    }

    pub fn feature(self) -> Feature {
        self.spec().feature
    }

    pub fn is_core(self) -> bool {
        matches!(self, ComponentId::CoreMeta | ComponentId::CoreTestcase)
    }

    /// Whether this is one of the network-access components
    pub fn is_network(self) -> bool {
        self.feature() == Feature::NetworkAccess
    }

    /// Asset components (everything except the two core ones)
    pub fn assets() -> impl Iterator<Item = ComponentId> {
        Self::ALL.into_iter().filter(|id| !id.is_core())
    }

    /// Look up the component owning an `assetPaths` key
    pub fn from_asset_key(key: &str) -> Option<ComponentId> {
        Self::assets().find(|id| id.asset_key() == Some(key))
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownComponent(s.to_string()))
    }
}

/// Components the metadata's feature flags make mandatory.
///
/// Always contains `core.meta` and `core.testcase`.
pub fn required_components(meta: &ProblemMeta) -> BTreeSet<ComponentId> {
    ComponentId::ALL
        .into_iter()
        .filter(|id| {
            let spec = id.spec();
            spec.required_when_enabled && spec.feature.enabled(meta)
        })
        .collect()
}

/// Included optional components whose feature is switched off in `meta`.
pub fn feature_alignment_mismatches(
    meta: &ProblemMeta,
    included: &BTreeSet<ComponentId>,
) -> Vec<ComponentId> {
    included
        .iter()
        .copied()
        .filter(|id| !id.is_core() && !id.feature().enabled(meta))
        .collect()
}

/// Fail if any included asset disagrees with the declared configuration
pub fn ensure_feature_alignment(
    meta: &ProblemMeta,
    included: &BTreeSet<ComponentId>,
) -> Result<(), ValidationError> {
    let mismatches = feature_alignment_mismatches(meta, included);
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::FeatureMismatch(mismatches))
    }
}

/// Fail if a component required by `meta` is not in `available`
pub fn ensure_required_present(
    meta: &ProblemMeta,
    available: &BTreeSet<ComponentId>,
) -> Result<(), ValidationError> {
    let missing: Vec<ComponentId> = required_components(meta)
        .into_iter()
        .filter(|id| !available.contains(id))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingRequiredComponents(missing))
    }
}
