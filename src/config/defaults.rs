//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

use crate::manifest::SOURCE_SYSTEM;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Largest single uncompressed entry accepted on import (default: 100 MB)
    pub max_file_size_mb: u64,

    /// Largest cumulative uncompressed size accepted on import (default: 500 MB)
    pub max_total_size_mb: u64,

    /// Highest uncompressed/compressed ratio of any entry (default: 100)
    pub max_compression_ratio: f64,

    /// Most central-directory entries accepted on import (default: 10000)
    pub max_entries: usize,

    /// Streaming chunk size in bytes (default: 1 MiB)
    pub chunk_size: usize,

    /// Label written into manifests (default: "Normal-OJ")
    pub source_system: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_total_size_mb: 500,
            max_compression_ratio: 100.0,
            max_entries: 10_000,
            chunk_size: noj_canon::DEFAULT_CHUNK_SIZE,
            source_system: SOURCE_SYSTEM.to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "limits": {
                "max_file_size_mb": self.max_file_size_mb,
                "max_total_size_mb": self.max_total_size_mb,
                "max_compression_ratio": self.max_compression_ratio,
                "max_entries": self.max_entries
            },
            "chunk_size": self.chunk_size,
            "source_system": self.source_system
        })
    }
}
