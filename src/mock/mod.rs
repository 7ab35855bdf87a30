//! In-memory stores for tests
//!
//! Implements the store traits over in-process maps, with configurable
//! failure injection for exercising error and rollback paths, plus sample
//! fixtures.

mod failure;
mod fixtures;
mod stores;

pub use failure::{FailureConfig, FailureInjector, StoreOperation};
pub use fixtures::{sample_meta, testcase_zip, zip_bytes, MockBackend, SeedProblem};
pub use stores::{MemoryCourseDirectory, MemoryObjectStore, MemoryProblemStore};
