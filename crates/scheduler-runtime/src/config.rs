use std::sync::Arc;
use std::time::Duration;

use metrics::Counter;
use scheduler_core::UnknownTaskPolicy;

/// Tunable knobs for a [`crate::Scheduler`].
///
/// Every field has a sensible default; most deployments only need to
/// override `scheduler_name` and `executor_threads`.
pub struct Config {
    /// Value written as `picked_by` on claimed rows; identifies this process
    /// to its peers.
    ///
    /// If two processes in the same fleet are misconfigured with the same
    /// name, the claim protocol still prevents double-execution of any
    /// single row (the version check is per-row), but heartbeat/reschedule
    /// calls issued by either process will succeed against rows "owned" by
    /// that name. Operators are responsible for keeping this unique per
    /// process.
    pub scheduler_name: Arc<str>,

    /// Number of worker-pool slots, i.e. the maximum number of executions
    /// this scheduler will run concurrently.
    pub executor_threads: usize,

    /// Period of the due-polling loop.
    pub polling_interval: Duration,

    /// Period of the heartbeat loop. The dead-detection loop runs at 2x this
    /// interval and considers a claim dead after 4x this interval without a
    /// heartbeat.
    pub heartbeat_interval: Duration,

    /// What to do when a row names a task that isn't in the registry.
    pub unknown_task_policy: UnknownTaskPolicy,

    /// Sink for the `unexpected_error` counter. Defaults to a counter that is
    /// never read.
    pub stats_registry: Counter,

    /// Per-loop grace period allotted during [`crate::Scheduler::stop`]
    /// before a loop's join handle is abandoned rather than awaited further.
    pub loop_shutdown_grace: Duration,

    /// Grace period allotted during [`crate::Scheduler::stop`] for in-flight
    /// executions to finish before `stop()` returns regardless.
    pub executor_shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler_name: default_scheduler_name(),
            executor_threads: 10,
            polling_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5 * 60),
            unknown_task_policy: UnknownTaskPolicy::default(),
            stats_registry: Counter::noop(),
            loop_shutdown_grace: Duration::from_secs(5),
            executor_shutdown_grace: Duration::from_secs(30 * 60),
        }
    }
}

impl Config {
    pub fn dead_detection_interval(&self) -> Duration {
        self.heartbeat_interval * 2
    }

    pub fn dead_threshold(&self) -> Duration {
        self.heartbeat_interval * 4
    }
}

fn default_scheduler_name() -> Arc<str> {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned().into(),
        Err(_) => "scheduler".into(),
    }
}
