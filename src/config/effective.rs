//! Effective configuration with provenance
//!
//! Defaults, an optional TOML file, the environment, and explicit overrides
//! are merged in that order and deserialized into [`ArchiveConfig`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

pub const ENV_MAX_FILE_SIZE_MB: &str = "PROBLEM_IMPORT_MAX_FILE_SIZE_MB";
pub const ENV_MAX_TOTAL_SIZE_MB: &str = "PROBLEM_IMPORT_MAX_TOTAL_SIZE_MB";
pub const ENV_MAX_COMPRESSION_RATIO: &str = "PROBLEM_IMPORT_MAX_COMPRESSION_RATIO";
pub const ENV_MAX_ENTRIES: &str = "PROBLEM_IMPORT_MAX_ENTRIES";

const MB: u64 = 1024 * 1024;

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
    Override,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Variables read (env layer only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
}

impl ConfigSource {
    fn new(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            path: None,
            digest: None,
            variables: Vec::new(),
        }
    }
}

/// Import gate limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveLimits {
    pub max_file_size_mb: u64,
    pub max_total_size_mb: u64,
    pub max_compression_ratio: f64,
    /// Counts directory entries too
    pub max_entries: usize,
}

impl ArchiveLimits {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(MB)
    }

    pub fn max_total_size_bytes(&self) -> u64 {
        self.max_total_size_mb.saturating_mul(MB)
    }
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            max_file_size_mb: defaults.max_file_size_mb,
            max_total_size_mb: defaults.max_total_size_mb,
            max_compression_ratio: defaults.max_compression_ratio,
            max_entries: defaults.max_entries,
        }
    }
}

/// Settings consumed by the writer, reader and batch service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub limits: ArchiveLimits,
    pub chunk_size: usize,
    pub source_system: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            limits: ArchiveLimits::default(),
            chunk_size: defaults.chunk_size,
            source_system: defaults.source_system,
        }
    }
}

impl ArchiveConfig {
    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be positive".to_string(),
            ));
        }
        if limits.max_total_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_total_size_mb must be positive".to_string(),
            ));
        }
        if !(limits.max_compression_ratio.is_finite() && limits.max_compression_ratio > 0.0) {
            return Err(ConfigError::ValidationError(
                "limits.max_compression_ratio must be a positive number".to_string(),
            ));
        }
        if limits.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_entries must be positive".to_string(),
            ));
        }
        if limits.max_file_size_mb > limits.max_total_size_mb {
            return Err(ConfigError::ValidationError(format!(
                "limits.max_file_size_mb ({}) must not exceed limits.max_total_size_mb ({})",
                limits.max_file_size_mb, limits.max_total_size_mb
            )));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunk_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Merged configuration plus where it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub created_at: DateTime<Utc>,

    pub config: ArchiveConfig,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build from the process environment
    pub fn from_env(file: Option<&Path>, overrides: Option<Value>) -> Result<Self, ConfigError> {
        Self::build(file, |name| std::env::var(name).ok(), overrides)
    }

    /// Build from layers; `env` looks up a variable by name
    pub fn build<F>(file: Option<&Path>, env: F, overrides: Option<Value>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource::new(ConfigOrigin::Builtin)];

        if let Some(path) = file {
            let (value, digest) = load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
                ..ConfigSource::new(ConfigOrigin::File)
            });
        }

        let (env_value, variables) = env_layer(&env)?;
        if !variables.is_empty() {
            layers.push(env_value);
            sources.push(ConfigSource {
                variables,
                ..ConfigSource::new(ConfigOrigin::Env)
            });
        }

        if let Some(overrides) = overrides {
            layers.push(overrides);
            sources.push(ConfigSource::new(ConfigOrigin::Override));
        }

        let merged = merge_layers(layers);
        let config: ArchiveConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;

        Ok(Self {
            created_at: Utc::now(),
            config,
            sources,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    let digest = noj_canon::digest(&bytes);

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(toml_value), digest))
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn env_layer<F>(env: &F) -> Result<(Value, Vec<String>), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut limits = serde_json::Map::new();
    let mut variables = Vec::new();

    for (name, key) in [
        (ENV_MAX_FILE_SIZE_MB, "max_file_size_mb"),
        (ENV_MAX_TOTAL_SIZE_MB, "max_total_size_mb"),
        (ENV_MAX_ENTRIES, "max_entries"),
    ] {
        if let Some(raw) = env(name) {
            let value: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::ParseError(format!("{} must be an integer, got {:?}", name, raw)))?;
            limits.insert(key.to_string(), json!(value));
            variables.push(name.to_string());
        }
    }

    if let Some(raw) = env(ENV_MAX_COMPRESSION_RATIO) {
        let ratio: f64 = raw.trim().parse().map_err(|_| {
            ConfigError::ParseError(format!(
                "{} must be a number, got {:?}",
                ENV_MAX_COMPRESSION_RATIO, raw
            ))
        })?;
        let ratio = serde_json::Number::from_f64(ratio).ok_or_else(|| {
            ConfigError::ValidationError(format!("{} must be finite", ENV_MAX_COMPRESSION_RATIO))
        })?;
        limits.insert("max_compression_ratio".to_string(), Value::Number(ratio));
        variables.push(ENV_MAX_COMPRESSION_RATIO.to_string());
    }

    Ok((json!({ "limits": limits }), variables))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
