//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Optional TOML file
//! 3. `PROBLEM_IMPORT_*` environment variables
//! 4. Explicit overrides

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    ArchiveConfig, ArchiveLimits, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig,
    ENV_MAX_COMPRESSION_RATIO, ENV_MAX_ENTRIES, ENV_MAX_FILE_SIZE_MB, ENV_MAX_TOTAL_SIZE_MB,
};
pub use merge::{deep_merge, merge_layers};
