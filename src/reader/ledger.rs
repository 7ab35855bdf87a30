//! Rollback ledger for a single import
//!
//! Records every side effect as it happens. Dropping the ledger without
//! [`commit`](ImportLedger::commit) undoes them in reverse order.

use tracing::{error, warn};

use crate::store::{ObjectStore, ProblemStore};

pub struct ImportLedger<'a> {
    objects: &'a dyn ObjectStore,
    problems: &'a dyn ProblemStore,
    uploaded: Vec<String>,
    created: Option<i64>,
    committed: bool,
}

impl<'a> ImportLedger<'a> {
    pub fn new(objects: &'a dyn ObjectStore, problems: &'a dyn ProblemStore) -> Self {
        Self {
            objects,
            problems,
            uploaded: Vec::new(),
            created: None,
            committed: false,
        }
    }

    pub fn record_problem(&mut self, problem_id: i64) {
        self.created = Some(problem_id);
    }

    /// Record an object key before it is written
    pub fn record_object(&mut self, key: impl Into<String>) {
        self.uploaded.push(key.into());
    }

    pub fn uploaded(&self) -> &[String] {
        &self.uploaded
    }

    /// Keep everything recorded so far
    pub fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        warn!(
            problem_id = ?self.created,
            objects = self.uploaded.len(),
            "rolling back import"
        );
        while let Some(key) = self.uploaded.pop() {
            if let Err(err) = self.objects.remove(&key) {
                error!(%key, %err, "failed to remove object during rollback");
            }
        }
        if let Some(problem_id) = self.created.take() {
            if let Err(err) = self.problems.delete(problem_id) {
                error!(problem_id, %err, "failed to delete problem during rollback");
            }
        }
    }
}

impl Drop for ImportLedger<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}
