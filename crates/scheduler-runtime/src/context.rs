use std::sync::Arc;
use std::time::Duration;

use metrics::{Counter, Gauge};
use scheduler_core::{Clock, ExecutionRepository, SchedulerState, TaskRegistry};

use crate::executing::CurrentlyExecuting;

/// Everything the three control loops need in common.
///
/// Built once by [`crate::SchedulerBuilder::build`] and shared (via `Arc`)
/// between the due-polling, dead-detection, and heartbeat loops.
pub(crate) struct LoopContext {
    pub repository: Arc<dyn ExecutionRepository>,
    pub registry: Arc<TaskRegistry>,
    pub clock: Arc<dyn Clock>,
    pub state: SchedulerState,
    pub scheduler_name: Arc<str>,
    pub executing: CurrentlyExecuting,
    pub heartbeat_interval: Duration,
    pub unexpected_error: Counter,
    pub in_flight_gauge: Gauge,
    pub free_slots_gauge: Gauge,
}
