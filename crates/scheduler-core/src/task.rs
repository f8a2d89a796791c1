use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::execution::{Execution, Outcome, TaskInstance};
use crate::repository::{ExecutionRepository, RepositoryError};
use crate::state::SchedulerState;

/// Everything a running task body can observe about the scheduler hosting it.
///
/// Task authors are expected to poll [`ExecutionContext::state`] during
/// long-running work so that shutdown remains cooperative; nothing forcibly
/// terminates `Task::execute` before the executor shutdown grace period
/// expires.
#[derive(Clone)]
pub struct ExecutionContext {
    pub task_instance: TaskInstance,
    pub scheduler_name: Arc<str>,
    pub state: SchedulerState,
    pub clock: Arc<dyn Clock>,
}

/// A handle, scoped to one specific execution, that a completion or
/// dead-execution handler uses to decide the row's fate.
pub struct Ops {
    repository: Arc<dyn ExecutionRepository>,
    execution: Execution,
    scheduler_name: Arc<str>,
    heartbeat_interval: std::time::Duration,
}

impl Ops {
    pub fn new(
        repository: Arc<dyn ExecutionRepository>,
        execution: Execution,
        scheduler_name: Arc<str>,
        heartbeat_interval: std::time::Duration,
    ) -> Self {
        Self {
            repository,
            execution,
            scheduler_name,
            heartbeat_interval,
        }
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    /// The scheduler's configured `heartbeat_interval`, the unit the default
    /// `on_dead` backs off by.
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        self.heartbeat_interval
    }

    /// Atomically free the row with a new `execution_time`, iff this
    /// scheduler still owns the claim.
    pub async fn reschedule(
        &self,
        next_execution_time: DateTime<Utc>,
        last_success: Option<DateTime<Utc>>,
        last_failure: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        self.repository
            .reschedule(
                &self.execution,
                &self.scheduler_name,
                next_execution_time,
                last_success,
                last_failure,
            )
            .await
    }

    /// Delete the row, iff this scheduler still owns the claim.
    pub async fn remove(&self) -> Result<(), RepositoryError> {
        self.repository.remove(&self.execution, &self.scheduler_name).await
    }
}

/// User-supplied policy for one task: how to run an instance, what to do
/// when it finishes, and how to recover an instance whose owning scheduler
/// has disappeared.
#[async_trait]
pub trait Task: Send + Sync {
    /// The name rows reference in `task_instance.task_name`.
    fn name(&self) -> &str;

    /// Run one instance of this task.
    ///
    /// A panic here is caught by the worker pool and treated identically to
    /// an `Err` return: the terminal result is [`Outcome::Failed`] and
    /// `on_complete` still runs.
    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()>;

    /// Decide the row's fate after `execute` returns or panics.
    ///
    /// The default removes the row on [`Outcome::Ok`] and leaves it claimed
    /// on [`Outcome::Failed`] — the stalled claim is picked up later by dead
    /// detection, which is the designed recovery path and must not be
    /// bypassed by catching errors here.
    async fn on_complete(&self, outcome: Outcome, now: DateTime<Utc>, ops: &Ops) -> anyhow::Result<()> {
        let _ = now;
        if outcome.is_ok() {
            ops.remove().await?;
        }

        Ok(())
    }

    /// Decide how to recover a row whose heartbeat has gone stale.
    ///
    /// The default reschedules one `heartbeat_interval` out from `now`, which
    /// is a reasonable backoff for most at-least-once retry policies; tasks
    /// with sharper recovery requirements should override this.
    async fn on_dead(
        &self,
        execution: &Execution,
        now: DateTime<Utc>,
        ops: &Ops,
    ) -> anyhow::Result<()> {
        let _ = execution;
        let backoff = chrono::Duration::from_std(ops.heartbeat_interval())
            .unwrap_or_else(|_| chrono::Duration::minutes(1));
        ops.reschedule(now + backoff, None, None).await?;

        Ok(())
    }
}
