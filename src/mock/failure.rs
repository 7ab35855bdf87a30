//! Failure injection for the in-memory stores
//!
//! Supports configurable failures for testing error and rollback paths.

use std::collections::HashMap;

/// Store call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    ObjectGet,
    ObjectPut,
    ObjectRemove,
    ProblemGet,
    ProblemCreate,
    ProblemUpdateAssets,
    ProblemDelete,
    CourseLookup,
}

/// Failure configuration for an operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error message to return
    pub message: String,
    /// Number of calls that succeed before failures start
    pub skip: u32,
    /// Number of times to fail before succeeding again (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Create a config that fails every call
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            skip: 0,
            fail_count: None,
        }
    }

    /// Let the first `skip` calls through
    pub fn after(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Per-operation failure injector
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<StoreOperation, FailureConfig>,
    call_counts: HashMap<StoreOperation, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for an operation, resetting its call count
    pub fn inject(&mut self, op: StoreOperation, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Record a call and return the failure message if it should fail
    pub fn check(&mut self, op: StoreOperation) -> Option<String> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        if *count <= config.skip {
            return None;
        }
        if let Some(limit) = config.fail_count {
            if *count - config.skip > limit {
                return None;
            }
        }
        Some(config.message.clone())
    }
}
