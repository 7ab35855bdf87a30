//! External collaborators of the archive engine
//!
//! The engine never talks to a real database or object service directly.
//! Callers hand it implementations of these traits; [`crate::mock`] provides
//! in-memory ones.

use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::meta::ProblemMeta;

/// Identity of the user performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub username: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_admin: false,
        }
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_admin: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub name: String,
    /// Teacher of the course; owns problems imported into it
    pub teacher: Option<String>,
}

/// A stored problem as the archive engine sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemRecord {
    pub id: i64,
    pub owner: String,
    pub courses: Vec<String>,
    pub meta: ProblemMeta,
    /// Object key of the graded test-case zip
    pub testcase_path: Option<String>,
    /// Object key of the trial public test data
    pub public_testdata_path: Option<String>,
    /// Object key of the trial reference solution
    pub ac_code_path: Option<String>,
    pub ac_code_language: Option<u8>,
}

impl ProblemRecord {
    pub fn is_test_case_ready(&self) -> bool {
        self.testcase_path.as_deref().map_or(false, |p| !p.is_empty())
    }
}

/// Fields of a record about to be created by an import
#[derive(Debug, Clone, PartialEq)]
pub struct NewProblem {
    pub owner: String,
    pub courses: Vec<String>,
    pub status: i64,
    pub meta: ProblemMeta,
}

/// Asset pointers written after the uploads of an import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetUpdate {
    pub testcase_path: Option<String>,
    pub public_testdata_path: Option<String>,
    pub ac_code_path: Option<String>,
    pub ac_code_language: Option<u8>,
    /// Replacement for `config.assetPaths`
    pub asset_paths: BTreeMap<String, String>,
}

/// Blob storage for test data and assets
pub trait ObjectStore: Send + Sync {
    /// Open an object for streaming reads
    fn get(&self, key: &str) -> Result<Box<dyn Read + Send + '_>, StorageError>;

    /// Store `len` bytes read from `reader` under `key`
    fn put(&self, key: &str, reader: &mut dyn Read, len: u64) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Document store holding problem records
pub trait ProblemStore: Send + Sync {
    fn get(&self, id: i64) -> Result<Option<ProblemRecord>, StorageError>;

    /// Create a record and return its new id
    fn create(&self, problem: NewProblem) -> Result<i64, StorageError>;

    fn update_assets(&self, id: i64, update: AssetUpdate) -> Result<(), StorageError>;

    fn delete(&self, id: i64) -> Result<(), StorageError>;
}

/// Course lookup and the write-capability check
pub trait CourseDirectory: Send + Sync {
    fn course(&self, name: &str) -> Result<Option<Course>, StorageError>;

    /// Whether `caller` may add problems to `course`
    fn can_modify(&self, caller: &Caller, course: &Course) -> bool;
}
