//! In-memory store implementations

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::sync::{Mutex, MutexGuard};

use super::failure::{FailureConfig, FailureInjector, StoreOperation};
use crate::error::StorageError;
use crate::store::{AssetUpdate, Caller, Course, CourseDirectory, NewProblem, ObjectStore, ProblemRecord, ProblemStore};

/// Lock ignoring poisoning; a panicking test must not cascade into others
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Object store backed by a map of byte vectors
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failures: Mutex<FailureInjector>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly (for test setup)
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(key.into(), data.into());
    }

    pub fn contents(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inject_failure(&self, op: StoreOperation, config: FailureConfig) {
        lock(&self.failures).inject(op, config);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    fn check(&self, op: StoreOperation, key: &str) -> Result<(), StorageError> {
        match lock(&self.failures).check(op) {
            Some(reason) => Err(StorageError::Object {
                key: key.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, key: &str) -> Result<Box<dyn Read + Send + '_>, StorageError> {
        self.check(StoreOperation::ObjectGet, key)?;
        let data = lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn put(&self, key: &str, reader: &mut dyn Read, len: u64) -> Result<(), StorageError> {
        self.check(StoreOperation::ObjectPut, key)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(|e| StorageError::Object {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        if data.len() as u64 != len {
            return Err(StorageError::Object {
                key: key.to_string(),
                reason: format!("expected {} bytes, read {}", len, data.len()),
            });
        }
        lock(&self.objects).insert(key.to_string(), data);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check(StoreOperation::ObjectRemove, key)?;
        lock(&self.objects).remove(key);
        Ok(())
    }
}

/// Document store keeping problem records in memory
#[derive(Debug)]
pub struct MemoryProblemStore {
    records: Mutex<BTreeMap<i64, ProblemRecord>>,
    next_id: Mutex<i64>,
    failures: Mutex<FailureInjector>,
}

impl Default for MemoryProblemStore {
    fn default() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: Mutex::new(1),
            failures: Mutex::new(FailureInjector::new()),
        }
    }
}

impl MemoryProblemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as-is, assigning a fresh id (for test setup)
    pub fn insert(&self, mut record: ProblemRecord) -> i64 {
        let id = self.allocate_id();
        record.id = id;
        lock(&self.records).insert(id, record);
        id
    }

    pub fn record(&self, id: i64) -> Option<ProblemRecord> {
        lock(&self.records).get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<i64> {
        lock(&self.records).keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inject_failure(&self, op: StoreOperation, config: FailureConfig) {
        lock(&self.failures).inject(op, config);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    fn allocate_id(&self) -> i64 {
        let mut next = lock(&self.next_id);
        let id = *next;
        *next += 1;
        id
    }

    fn check(&self, op: StoreOperation) -> Result<(), StorageError> {
        match lock(&self.failures).check(op) {
            Some(reason) => Err(StorageError::Document(reason)),
            None => Ok(()),
        }
    }
}

impl ProblemStore for MemoryProblemStore {
    fn get(&self, id: i64) -> Result<Option<ProblemRecord>, StorageError> {
        self.check(StoreOperation::ProblemGet)?;
        Ok(self.record(id))
    }

    fn create(&self, problem: NewProblem) -> Result<i64, StorageError> {
        self.check(StoreOperation::ProblemCreate)?;
        let mut meta = problem.meta;
        meta.status = Some(problem.status);
        meta.courses = Some(problem.courses.clone());
        meta.owner = None;
        let record = ProblemRecord {
            id: 0,
            owner: problem.owner,
            courses: problem.courses,
            meta,
            testcase_path: None,
            public_testdata_path: None,
            ac_code_path: None,
            ac_code_language: None,
        };
        Ok(self.insert(record))
    }

    fn update_assets(&self, id: i64, update: AssetUpdate) -> Result<(), StorageError> {
        self.check(StoreOperation::ProblemUpdateAssets)?;
        let mut records = lock(&self.records);
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StorageError::Document(format!("problem {} does not exist", id)))?;

        if update.testcase_path.is_some() {
            record.testcase_path = update.testcase_path;
        }
        if update.public_testdata_path.is_some() {
            record.public_testdata_path = update.public_testdata_path;
        }
        if update.ac_code_path.is_some() {
            record.ac_code_path = update.ac_code_path;
            record.ac_code_language = update.ac_code_language;
        }
        if !update.asset_paths.is_empty() {
            record.meta.config_mut().asset_paths = Some(update.asset_paths);
        }
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<(), StorageError> {
        self.check(StoreOperation::ProblemDelete)?;
        lock(&self.records).remove(&id);
        Ok(())
    }
}

/// Course directory with explicit writer grants
#[derive(Debug, Default)]
pub struct MemoryCourseDirectory {
    courses: Mutex<BTreeMap<String, Course>>,
    writers: Mutex<BTreeMap<String, BTreeSet<String>>>,
    failures: Mutex<FailureInjector>,
}

impl MemoryCourseDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a course; its teacher may modify it
    pub fn add_course(&self, name: impl Into<String>, teacher: Option<&str>) {
        let name = name.into();
        lock(&self.courses).insert(
            name.clone(),
            Course {
                name,
                teacher: teacher.map(str::to_string),
            },
        );
    }

    /// Grant modify capability on `course` to `username`
    pub fn grant(&self, course: &str, username: &str) {
        lock(&self.writers)
            .entry(course.to_string())
            .or_default()
            .insert(username.to_string());
    }

    pub fn inject_failure(&self, op: StoreOperation, config: FailureConfig) {
        lock(&self.failures).inject(op, config);
    }
}

impl CourseDirectory for MemoryCourseDirectory {
    fn course(&self, name: &str) -> Result<Option<Course>, StorageError> {
        if let Some(reason) = lock(&self.failures).check(StoreOperation::CourseLookup) {
            return Err(StorageError::Document(reason));
        }
        Ok(lock(&self.courses).get(name).cloned())
    }

    fn can_modify(&self, caller: &Caller, course: &Course) -> bool {
        if caller.is_admin || course.teacher.as_deref() == Some(caller.username.as_str()) {
            return true;
        }
        lock(&self.writers)
            .get(&course.name)
            .map_or(false, |users| users.contains(&caller.username))
    }
}
