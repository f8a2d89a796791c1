use std::collections::HashMap;
use std::sync::Arc;

use crate::task::Task;

/// What to do when a durable row names a task that isn't registered.
///
/// This happens in practice when a deployment removes a task definition
/// while rows referencing it are still scheduled, or when two fleets share a
/// database during a rolling upgrade.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum UnknownTaskPolicy {
    /// Leave the row in place, emit a warning, and exclude it from due/dead
    /// scans. This is the default: it never wedges a loop on a single bad
    /// row.
    #[default]
    WarnAndSkip,

    /// Fail the scan outright. The failure is treated as a transient store
    /// error, so the loop retries on its next tick rather than exiting.
    Fail,
}

/// Maps a task name to its execution, completion, and dead-execution
/// handlers.
///
/// Built once via [`TaskRegistryBuilder`] and immutable for the lifetime of
/// the scheduler.
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
    policy: UnknownTaskPolicy,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    pub fn get(&self, task_name: &str) -> Option<&Arc<dyn Task>> {
        self.tasks.get(task_name)
    }

    pub fn policy(&self) -> UnknownTaskPolicy {
        self.policy
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
        self.tasks.values()
    }
}

#[derive(Default)]
pub struct TaskRegistryBuilder {
    tasks: HashMap<String, Arc<dyn Task>>,
    policy: UnknownTaskPolicy,
}

impl TaskRegistryBuilder {
    pub fn task(mut self, task: Arc<dyn Task>) -> Self {
        self.tasks.insert(task.name().to_owned(), task);
        self
    }

    pub fn unknown_task_policy(mut self, policy: UnknownTaskPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            tasks: self.tasks,
            policy: self.policy,
        }
    }
}
