use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use scheduler_core::{Clock, Execution, ExecutionContext, ExecutionRepository, Ops, Outcome, SchedulerState, Task};

use crate::metrics::MetricSpan;

/// Run one claimed execution to completion and invoke its completion
/// handler.
///
/// A panic inside `Task::execute` is caught with `AssertUnwindSafe` +
/// `catch_unwind` and treated identically to an `Err` return: the terminal
/// result is [`Outcome::Failed`] and the completion handler still runs. The
/// completion handler call is wrapped the same way, so that a panic there
/// cannot unwind out of this function and skip the caller's
/// `CurrentlyExecuting` cleanup. If the completion handler errors or panics,
/// the row is left claimed — the designed recovery path is dead detection
/// picking it up later, and this function must not paper over that by
/// retrying here.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_execution(
    task: Arc<dyn Task>,
    repository: Arc<dyn ExecutionRepository>,
    clock: Arc<dyn Clock>,
    state: SchedulerState,
    scheduler_name: Arc<str>,
    execution: Execution,
    heartbeat_interval: Duration,
    in_flight_gauge: metrics::Gauge,
    unexpected_error: metrics::Counter,
) {
    let _span = MetricSpan::enter(in_flight_gauge);
    let task_instance = execution.task_instance.clone();

    let ctx = ExecutionContext {
        task_instance: task_instance.clone(),
        scheduler_name: scheduler_name.clone(),
        state,
        clock: clock.clone(),
    };

    let outcome = match AssertUnwindSafe(task.execute(&ctx)).catch_unwind().await {
        Ok(Ok(())) => Outcome::Ok,
        Ok(Err(error)) => {
            tracing::error!(%task_instance, "task execution returned an error: {error:?}");
            unexpected_error.increment(1);
            Outcome::Failed
        }
        Err(payload) => {
            tracing::error!(%task_instance, "task execution panicked: {}", panic_message(&payload));
            unexpected_error.increment(1);
            Outcome::Failed
        }
    };

    let now = clock.now();
    let ops = Ops::new(repository, execution, scheduler_name, heartbeat_interval);

    let result = AssertUnwindSafe(task.on_complete(outcome, now, &ops))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(anyhow::anyhow!("completion handler panicked: {}", panic_message(&payload))));

    if let Err(error) = result {
        tracing::error!(
            %task_instance,
            "completion handler failed, leaving the row claimed for dead detection: {error:?}",
        );
        unexpected_error.increment(1);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else {
        "Box<dyn Any>"
    }
}
