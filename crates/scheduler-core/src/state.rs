use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Process-wide `{running, shutting_down}` flags, with `shutting_down`
/// additionally exposed as a one-shot async flag.
///
/// Single writer (the scheduler lifecycle), many readers (all three control
/// loops, the [`crate::Waiter`] each of them sleeps on, and user task code
/// via [`crate::ExecutionContext`]). Cheaply cloned; every clone observes the
/// same underlying flags.
#[derive(Clone)]
pub struct SchedulerState(Arc<Inner>);

struct Inner {
    running: AtomicBool,
    shutting_down: AtomicBool,
    shutdown: Notify,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerState {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            shutdown: Notify::new(),
        }))
    }

    pub fn is_running(&self) -> bool {
        self.0.running.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.0.shutting_down.load(Ordering::Acquire)
    }

    /// Mark the scheduler as running. Only the scheduler lifecycle should
    /// call this.
    pub fn mark_running(&self) {
        self.0.running.store(true, Ordering::Release);
        self.0.shutting_down.store(false, Ordering::Release);
    }

    /// Mark the scheduler as shutting down and wake every pending
    /// [`SchedulerState::wait_for_shutdown`] (and, transitively, every
    /// [`crate::Waiter::wait`] currently sleeping). Only the scheduler
    /// lifecycle should call this.
    pub fn mark_shutting_down(&self) {
        self.0.shutting_down.store(true, Ordering::Release);
        self.0.shutdown.notify_waiters();
    }

    /// Mark the scheduler as stopped. Only the scheduler lifecycle should
    /// call this.
    pub fn mark_stopped(&self) {
        self.0.running.store(false, Ordering::Release);
    }

    /// Resolve immediately if shutdown has already been requested, otherwise
    /// wait for the next [`SchedulerState::mark_shutting_down`] call.
    ///
    /// Checks `is_shutting_down` both before and after registering for a
    /// notification, so a `mark_shutting_down` that lands between the two
    /// checks is still observed rather than missed.
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutting_down() {
            return;
        }

        let notified = self.0.shutdown.notified();

        if self.is_shutting_down() {
            return;
        }

        notified.await;
    }
}
