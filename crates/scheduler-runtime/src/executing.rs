use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scheduler_core::{Execution, TaskInstance};

struct Entry {
    execution: Execution,
    #[allow(dead_code)]
    started_at: DateTime<Utc>,
}

/// Per-scheduler record of executions currently running in the worker pool.
///
/// Written by the due-polling loop (insert on successful claim, remove on
/// worker completion) and read by the heartbeat loop, which snapshots it
/// without holding the lock across a store round-trip.
#[derive(Clone, Default)]
pub(crate) struct CurrentlyExecuting(Arc<Mutex<HashMap<TaskInstance, Entry>>>);

impl CurrentlyExecuting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, execution: Execution, started_at: DateTime<Utc>) {
        self.0
            .lock()
            .insert(execution.task_instance.clone(), Entry { execution, started_at });
    }

    pub fn remove(&self, task_instance: &TaskInstance) {
        self.0.lock().remove(task_instance);
    }

    pub fn snapshot(&self) -> Vec<Execution> {
        self.0.lock().values().map(|entry| entry.execution.clone()).collect()
    }
}
