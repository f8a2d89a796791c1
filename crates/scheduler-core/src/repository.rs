use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::execution::{Execution, NewExecution};

/// An opaque error returned by an [`ExecutionRepository`].
///
/// The variants are intentionally hidden behind this newtype so that callers
/// match on [`RepositoryError::kind`] rather than reaching into
/// storage-specific detail. The underlying cause is always available via
/// `source`.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct RepositoryError(#[from] ErrorData);

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match &self.0 {
            ErrorData::Store(_) => ErrorKind::Store,
            ErrorData::NotOwner => ErrorKind::NotOwner,
            ErrorData::Unsupported => ErrorKind::Unsupported,
        }
    }

    /// A transient error talking to the backing store.
    pub fn store(cause: impl Into<anyhow::Error>) -> Self {
        ErrorData::Store(cause.into()).into()
    }

    /// `reschedule`/`remove`/`update_heartbeat` was attempted by a scheduler
    /// that no longer (or never did) own the claim on this row.
    pub fn not_owner() -> Self {
        ErrorData::NotOwner.into()
    }

    /// This repository implementation does not support the requested
    /// operation at all (used by the in-memory store's `update_heartbeat`).
    pub fn unsupported() -> Self {
        ErrorData::Unsupported.into()
    }
}

#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// A transient error occurred talking to the backing store. The caller
    /// should log it, count it, and retry on the next tick.
    Store,

    /// The caller no longer owns the claim on the row it tried to mutate.
    NotOwner,

    /// The operation is not implemented by this repository.
    Unsupported,
}

#[derive(Debug, thiserror::Error)]
enum ErrorData {
    #[error("execution repository error: {0}")]
    Store(#[source] anyhow::Error),
    #[error("execution is no longer owned by this scheduler")]
    NotOwner,
    #[error("this operation is not supported by this execution repository")]
    Unsupported,
}

/// Durable store of scheduled executions with atomic claim/release/reschedule.
///
/// This is the sole synchronization point between schedulers contending for
/// the same work: every mutating method is a single atomic store operation
/// guarded by the row's `version`, so correctness never depends on holding a
/// lock across a network round-trip or across user code.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Insert a row iff no row with the same `task_instance` exists.
    ///
    /// Returns `Ok(true)` iff this call performed the insertion. Concurrent
    /// calls with the same `task_instance` must produce exactly one
    /// insertion across all callers.
    async fn create_if_not_exists(&self, execution: NewExecution) -> Result<bool, RepositoryError>;

    /// All free rows with `execution_time <= now`, sorted ascending by
    /// `execution_time` with ties broken by `task_instance` for determinism.
    async fn get_due(&self, now: DateTime<Utc>) -> Result<Vec<Execution>, RepositoryError>;

    /// Atomically transition `execution` from free to claimed by
    /// `scheduler_name`, iff the row still exists, is still free, and its
    /// version still matches. Returns the updated row on success, `Ok(None)`
    /// if another scheduler won the race.
    async fn pick(
        &self,
        execution: &Execution,
        scheduler_name: &str,
        time_picked: DateTime<Utc>,
    ) -> Result<Option<Execution>, RepositoryError>;

    /// Refresh `last_heartbeat` iff the row is still claimed by
    /// `scheduler_name`. Silently no-ops otherwise.
    async fn update_heartbeat(
        &self,
        execution: &Execution,
        scheduler_name: &str,
        t: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Atomically transition the row back to free with a new
    /// `execution_time` and updated outcome timestamps, iff `scheduler_name`
    /// still owns the claim. Returns [`RepositoryError::not_owner`] on a
    /// version mismatch — a recurring task must not double-schedule.
    async fn reschedule(
        &self,
        execution: &Execution,
        scheduler_name: &str,
        next_execution_time: DateTime<Utc>,
        last_success: Option<DateTime<Utc>>,
        last_failure: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;

    /// Delete the row iff `scheduler_name` still owns the claim.
    async fn remove(&self, execution: &Execution, scheduler_name: &str) -> Result<(), RepositoryError>;

    /// All claimed rows whose `last_heartbeat <= older_than`, any owner,
    /// sorted ascending by `execution_time`.
    async fn get_old_executions(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Execution>, RepositoryError>;

    /// Informational: rows whose `last_failure` is older than `now -
    /// duration` and which have no newer `last_success`. May be empty on
    /// non-durable stores.
    async fn get_executions_failing_longer_than(
        &self,
        duration: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Execution>, RepositoryError>;
}
