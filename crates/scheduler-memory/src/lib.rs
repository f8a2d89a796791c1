//! Non-durable [`ExecutionRepository`] implementation backed by a single
//! `Mutex`-guarded `HashMap`.
//!
//! This is what the scheduler's own test suite and single-node deployments
//! use. It honors the same claim/version contract as `scheduler-postgres`
//! (every mutation is a single lock-guarded check-and-write, so the lock is
//! never held across an `.await`), with two deliberate gaps documented by
//! the contract itself: `update_heartbeat` is unimplemented, and
//! `get_executions_failing_longer_than` always returns an empty list.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scheduler_core::{Execution, ExecutionRepository, NewExecution, RepositoryError, TaskInstance};

/// An in-memory [`ExecutionRepository`]. Cheap to construct and cheap to
/// clone — every clone shares the same underlying store, so a test (or a
/// caller) can hand one clone to a scheduler and keep another around to
/// inspect via [`MemoryRepository::snapshot`].
#[derive(Clone, Default)]
pub struct MemoryRepository {
    rows: Arc<Mutex<HashMap<TaskInstance, Execution>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every row currently in the store. Intended for test
    /// assertions, not production code paths.
    pub fn snapshot(&self) -> Vec<Execution> {
        self.rows.lock().values().cloned().collect()
    }
}

fn owns(execution: &Execution, row: &Execution, scheduler_name: &str) -> bool {
    row.picked
        && row.picked_by.as_deref() == Some(scheduler_name)
        && row.version == execution.version
}

#[async_trait]
impl ExecutionRepository for MemoryRepository {
    async fn create_if_not_exists(&self, execution: NewExecution) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&execution.task_instance) {
            return Ok(false);
        }

        rows.insert(execution.task_instance.clone(), Execution::new_free(execution));
        Ok(true)
    }

    async fn get_due(&self, now: DateTime<Utc>) -> Result<Vec<Execution>, RepositoryError> {
        let rows = self.rows.lock();
        let mut due: Vec<Execution> = rows.values().filter(|row| row.is_due(now)).cloned().collect();
        due.sort_by(|a, b| {
            a.execution_time
                .cmp(&b.execution_time)
                .then_with(|| a.task_instance.cmp(&b.task_instance))
        });

        Ok(due)
    }

    async fn pick(
        &self,
        execution: &Execution,
        scheduler_name: &str,
        time_picked: DateTime<Utc>,
    ) -> Result<Option<Execution>, RepositoryError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&execution.task_instance) else {
            return Ok(None);
        };

        if row.picked || row.version != execution.version {
            return Ok(None);
        }

        row.picked = true;
        row.picked_by = Some(scheduler_name.to_owned());
        row.last_heartbeat = Some(time_picked);
        row.version += 1;

        Ok(Some(row.clone()))
    }

    async fn update_heartbeat(
        &self,
        _execution: &Execution,
        _scheduler_name: &str,
        _t: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::unsupported())
    }

    async fn reschedule(
        &self,
        execution: &Execution,
        scheduler_name: &str,
        next_execution_time: DateTime<Utc>,
        last_success: Option<DateTime<Utc>>,
        last_failure: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&execution.task_instance) else {
            return Err(RepositoryError::not_owner());
        };

        if !owns(execution, row, scheduler_name) {
            return Err(RepositoryError::not_owner());
        }

        row.execution_time = next_execution_time;
        row.picked = false;
        row.picked_by = None;
        row.last_heartbeat = None;
        if last_success.is_some() {
            row.last_success = last_success;
        }
        if last_failure.is_some() {
            row.last_failure = last_failure;
        }
        row.version += 1;

        Ok(())
    }

    async fn remove(&self, execution: &Execution, scheduler_name: &str) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get(&execution.task_instance) else {
            return Err(RepositoryError::not_owner());
        };

        if !owns(execution, row, scheduler_name) {
            return Err(RepositoryError::not_owner());
        }

        rows.remove(&execution.task_instance);
        Ok(())
    }

    async fn get_old_executions(&self, older_than: DateTime<Utc>) -> Result<Vec<Execution>, RepositoryError> {
        let rows = self.rows.lock();
        let mut old: Vec<Execution> = rows.values().filter(|row| row.is_dead(older_than)).cloned().collect();
        old.sort_by(|a, b| a.execution_time.cmp(&b.execution_time));

        Ok(old)
    }

    async fn get_executions_failing_longer_than(
        &self,
        _duration: chrono::Duration,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Execution>, RepositoryError> {
        Ok(Vec::new())
    }
}
