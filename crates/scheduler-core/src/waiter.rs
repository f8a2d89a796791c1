use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;

use crate::clock::Clock;
use crate::state::SchedulerState;

struct Shared {
    duration: Duration,
    clock: Arc<dyn Clock>,
    state: SchedulerState,
    notify: Notify,
}

/// An interruptible sleep of a fixed duration, shared by a control loop and
/// the scheduler lifecycle that may need to cut its current wait short.
///
/// Each of the three control loops owns one `Waiter` built with its own tick
/// interval. `wait()` races the sleep against both an explicit [`Waiter::wake`]
/// and the shared [`SchedulerState`] being marked shutting down, so every loop
/// observes shutdown within one scheduling round-trip no matter which path
/// (`Scheduler::stop`, `SchedulerHandle::request_shutdown`, or a direct
/// `wake()`) triggered it, rather than waiting out its full interval.
#[derive(Clone)]
pub struct Waiter(Arc<Shared>);

impl Waiter {
    pub fn new(duration: Duration, clock: Arc<dyn Clock>, state: SchedulerState) -> Self {
        Self(Arc::new(Shared {
            duration,
            clock,
            state,
            notify: Notify::new(),
        }))
    }

    /// Block up to the configured duration, shortened by up to 25% of jitter
    /// so that sibling schedulers on the same polling cadence don't all wake
    /// in lockstep. Returns `true` iff the wait ended early, either because
    /// `wake()` was called or because the scheduler was marked shutting down.
    pub async fn wait(&self) -> bool {
        if self.0.state.is_shutting_down() {
            return true;
        }

        let max_jitter_nanos = (self.0.duration.as_nanos() / 4).min(u64::MAX as u128) as u64;
        let jitter = rand::thread_rng().gen_range(0..=max_jitter_nanos);
        let duration = self.0.duration - Duration::from_nanos(jitter);
        let sleep = self.0.clock.sleep(duration);
        tokio::select! {
            biased;

            _ = self.0.notify.notified() => true,
            _ = self.0.state.wait_for_shutdown() => true,
            _ = sleep => false,
        }
    }

    /// Cause any in-progress (or the next) `wait()` to return `true`
    /// immediately.
    ///
    /// Uses `notify_one`'s single-permit semantics rather than
    /// `notify_waiters` so a `wake()` landing just before a loop begins its
    /// next `wait()` is not lost.
    pub fn wake(&self) {
        self.0.notify.notify_one();
    }
}
