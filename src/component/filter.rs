//! Caller-supplied component selection

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ComponentId;
use crate::error::ValidationError;
use crate::meta::ProblemMeta;

/// Metadata-only selections that carry no files
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SettingsGroup {
    #[serde(rename = "settings.network")]
    Network,
    #[serde(rename = "settings.ai_ta")]
    AiTa,
    #[serde(rename = "settings.artifact")]
    Artifact,
    #[serde(rename = "settings.file_access")]
    FileAccess,
    #[serde(rename = "static_analysis")]
    StaticAnalysis,
}

impl SettingsGroup {
    pub const ALL: [SettingsGroup; 5] = [
        SettingsGroup::Network,
        SettingsGroup::AiTa,
        SettingsGroup::Artifact,
        SettingsGroup::FileAccess,
        SettingsGroup::StaticAnalysis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingsGroup::Network => "settings.network",
            SettingsGroup::AiTa => "settings.ai_ta",
            SettingsGroup::Artifact => "settings.artifact",
            SettingsGroup::FileAccess => "settings.file_access",
            SettingsGroup::StaticAnalysis => "static_analysis",
        }
    }
}

impl fmt::Display for SettingsGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingsGroup {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|group| group.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownComponent(s.to_string()))
    }
}

/// A restriction of export or import to a subset of components.
///
/// Core components are always members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFilter {
    components: BTreeSet<ComponentId>,
    settings: BTreeSet<SettingsGroup>,
}

impl ComponentFilter {
    /// Filter holding only the core components and no settings groups
    pub fn core_only() -> Self {
        Self {
            components: ComponentId::CORE.into_iter().collect(),
            settings: BTreeSet::new(),
        }
    }

    /// Parse caller-supplied ids. Unknown ids are rejected.
    pub fn parse<I, S>(ids: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::core_only();
        for raw in ids {
            let id = raw.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            if let Ok(component) = id.parse::<ComponentId>() {
                filter.components.insert(component);
            } else {
                filter.settings.insert(id.parse::<SettingsGroup>()?);
            }
        }
        Ok(filter)
    }

    /// Like [`parse`](Self::parse), but an empty selection means "no filter"
    pub fn parse_optional<I, S>(ids: I) -> Result<Option<Self>, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<S> = ids
            .into_iter()
            .filter(|id| !id.as_ref().trim().is_empty())
            .collect();
        if ids.is_empty() {
            return Ok(None);
        }
        Self::parse(ids).map(Some)
    }

    pub fn with_component(mut self, id: ComponentId) -> Self {
        self.components.insert(id);
        self
    }

    pub fn with_settings(mut self, group: SettingsGroup) -> Self {
        self.settings.insert(group);
        self
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.components.contains(&id)
    }

    pub fn includes_settings(&self, group: SettingsGroup) -> bool {
        self.settings.contains(&group)
    }

    pub fn insert(&mut self, id: ComponentId) {
        self.components.insert(id);
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = ComponentId>) {
        self.components.extend(ids);
    }

    pub fn components(&self) -> &BTreeSet<ComponentId> {
        &self.components
    }
}

/// Strip configuration sub-trees of settings groups the filter leaves out.
pub fn apply_component_filter(meta: &mut ProblemMeta, filter: &ComponentFilter) {
    let keep = |group| filter.includes_settings(group);
    let config = meta.config_mut();

    if !keep(SettingsGroup::Network) {
        config.network_access_enabled = None;
        config.network_access_restriction = None;
    }
    if !keep(SettingsGroup::AiTa) {
        config.ai_vtuber = None;
        config.ai_vtuber_mode = None;
        config.ai_max_token = None;
        config.ai_vtuber_api_keys = None;
    }
    if !keep(SettingsGroup::Artifact) {
        config.artifact_collection = None;
    }
    if !keep(SettingsGroup::FileAccess) {
        config.allow_read = None;
        config.allow_write = None;
    }
    if !keep(SettingsGroup::StaticAnalysis) {
        config.static_analysis = None;
        // misspelled key written by old clients
        config.extra.remove("staticAnalys");
    }

    let pipeline = meta.pipeline_mut();
    if !keep(SettingsGroup::Network) {
        if let Some(analysis) = pipeline.static_analysis.as_mut() {
            analysis.remove("networkAccessRestriction");
        }
    }
    if !keep(SettingsGroup::FileAccess) {
        pipeline.allow_read = None;
        pipeline.allow_write = None;
    }
    if !keep(SettingsGroup::StaticAnalysis) {
        pipeline.static_analysis = None;
    }
}
