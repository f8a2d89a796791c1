use std::sync::Arc;

use scheduler_core::Waiter;

use crate::context::LoopContext;

/// Periodically refreshes the heartbeat timestamp of every execution this
/// scheduler currently has in flight.
///
/// Snapshots `CurrentlyExecuting` (lock, clone, unlock) before issuing any
/// store calls so the lock is never held across an `.await`. Individual
/// failures are logged and counted but do not abort the tick — a transient
/// failure to refresh one execution's heartbeat should not block refreshing
/// the rest.
pub(crate) async fn run(ctx: Arc<LoopContext>, waiter: Waiter) {
    loop {
        if ctx.state.is_shutting_down() {
            break;
        }

        tick(&ctx).await;

        if waiter.wait().await {
            continue;
        }
    }
}

async fn tick(ctx: &Arc<LoopContext>) {
    let snapshot = ctx.executing.snapshot();
    let now = ctx.clock.now();

    for execution in snapshot {
        if let Err(error) = ctx
            .repository
            .update_heartbeat(&execution, &ctx.scheduler_name, now)
            .await
        {
            tracing::debug!(
                task_instance = %execution.task_instance,
                "failed to refresh heartbeat: {error}",
            );
            ctx.unexpected_error.increment(1);
        }
    }
}
