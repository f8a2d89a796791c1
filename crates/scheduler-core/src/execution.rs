use chrono::{DateTime, Utc};

/// Identifies a task's handler together with a specific instance of it.
///
/// The pair is globally unique while an [`Execution`] is scheduled: at most
/// one row may exist per `task_instance` at any time (enforced by
/// [`ExecutionRepository::create_if_not_exists`](crate::ExecutionRepository::create_if_not_exists)).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskInstance {
    pub task_name: String,
    pub instance_id: String,
}

impl TaskInstance {
    pub fn new(task_name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            instance_id: instance_id.into(),
        }
    }
}

impl std::fmt::Display for TaskInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.task_name, self.instance_id)
    }
}

/// A row as it should be inserted by
/// [`ExecutionRepository::create_if_not_exists`](crate::ExecutionRepository::create_if_not_exists).
#[derive(Clone, Debug)]
pub struct NewExecution {
    pub task_instance: TaskInstance,
    pub execution_time: DateTime<Utc>,
}

impl NewExecution {
    pub fn new(task_instance: TaskInstance, execution_time: DateTime<Utc>) -> Self {
        Self {
            task_instance,
            execution_time,
        }
    }
}

/// A scheduled occurrence of a task instance at a specific time.
///
/// A row is either *free* (`picked = false`, no `picked_by`, no
/// `last_heartbeat`) or *claimed* (`picked = true`, `picked_by` set,
/// `last_heartbeat` set). Only the scheduler named in `picked_by` may update a
/// claimed row; the store enforces this via the optimistic `version` check on
/// every mutating operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub task_instance: TaskInstance,
    pub execution_time: DateTime<Utc>,
    pub picked: bool,
    pub picked_by: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Execution {
    /// Construct a fresh, free row as it would look immediately after
    /// `create_if_not_exists`. Repository implementations use this as their
    /// canonical "row zero" so the initial `version` only needs to be picked
    /// in one place.
    pub fn new_free(new: NewExecution) -> Self {
        Self {
            task_instance: new.task_instance,
            execution_time: new.execution_time,
            picked: false,
            picked_by: None,
            last_heartbeat: None,
            last_success: None,
            last_failure: None,
            version: 0,
        }
    }

    /// True iff this row is free and due to run at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.picked && self.execution_time <= now
    }

    /// True iff this row is claimed and its heartbeat has not been refreshed
    /// since `older_than`.
    pub fn is_dead(&self, older_than: DateTime<Utc>) -> bool {
        self.picked
            && self
                .last_heartbeat
                .is_some_and(|heartbeat| heartbeat <= older_than)
    }
}

/// The terminal result of running a task's `execute` body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed,
}

impl Outcome {
    pub fn is_ok(self) -> bool {
        matches!(self, Outcome::Ok)
    }
}
