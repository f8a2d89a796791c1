use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// A bounded pool of worker slots backing one scheduler.
///
/// A `Semaphore` caps concurrency and a `JoinSet` tracks in-flight runnables
/// so shutdown can drain them. There is no queue — `try_acquire_slot` either
/// returns a permit immediately or reports that none is free, so a scheduler
/// never claims more work than it can currently run.
pub(crate) struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    pub fn new(slots: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(slots)),
            tasks: JoinSet::new(),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn try_acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    pub fn spawn(&mut self, future: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks.spawn(future);
    }

    /// Reap any runnables that have already finished so the `JoinSet` doesn't
    /// grow without bound between due-polling ticks.
    pub fn reap_finished(&mut self) {
        while self.tasks.try_join_next().is_some() {}
    }

    /// Wait up to `grace` for in-flight runnables to finish. Any still
    /// running afterward are abandoned, not aborted, since user code is
    /// given no forced-termination guarantee.
    pub async fn drain(&mut self, grace: std::time::Duration) {
        let deadline = tokio::time::Instant::now() + grace;

        while !self.tasks.is_empty() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                tracing::warn!(
                    remaining = self.tasks.len(),
                    grace = %humantime::Duration::from(grace),
                    "executor shutdown grace period elapsed with executions still in flight",
                );
                break;
            }

            match tokio::time::timeout(remaining, self.tasks.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        remaining = self.tasks.len(),
                        grace = %humantime::Duration::from(grace),
                        "executor shutdown grace period elapsed with executions still in flight",
                    );
                    break;
                }
            }
        }
    }
}
