use std::sync::Arc;

use scheduler_core::{Ops, UnknownTaskPolicy, Waiter};

use crate::context::LoopContext;

/// Finds executions whose heartbeat has gone stale and hands them to their
/// task's dead-execution handler.
///
/// Tick interval and dead threshold are derived from `heartbeat_interval` by
/// the caller (2x and 4x respectively) rather than configured independently,
/// giving at least one missed heartbeat of slack before a row is considered
/// dead and avoiding false positives from transient GC pauses or store
/// latency.
pub(crate) async fn run(ctx: Arc<LoopContext>, waiter: Waiter, dead_threshold: chrono::Duration) {
    loop {
        if ctx.state.is_shutting_down() {
            break;
        }

        if let Err(error) = tick(&ctx, dead_threshold).await {
            tracing::error!("dead-detection loop failed to scan for stale executions: {error:?}");
            ctx.unexpected_error.increment(1);
        }

        if waiter.wait().await {
            continue;
        }
    }
}

async fn tick(ctx: &Arc<LoopContext>, dead_threshold: chrono::Duration) -> anyhow::Result<()> {
    let now = ctx.clock.now();
    let dead = ctx.repository.get_old_executions(now - dead_threshold).await?;

    for execution in dead {
        if ctx.state.is_shutting_down() {
            break;
        }

        let Some(task) = ctx.registry.get(&execution.task_instance.task_name).cloned() else {
            match ctx.registry.policy() {
                UnknownTaskPolicy::WarnAndSkip => {
                    tracing::warn!(
                        task_instance = %execution.task_instance,
                        "skipping dead execution: no task named `{}` is registered",
                        execution.task_instance.task_name,
                    );
                    continue;
                }
                UnknownTaskPolicy::Fail => {
                    anyhow::bail!(
                        "no task named `{}` is registered",
                        execution.task_instance.task_name
                    );
                }
            }
        };

        let ops = Ops::new(
            ctx.repository.clone(),
            execution.clone(),
            ctx.scheduler_name.clone(),
            ctx.heartbeat_interval,
        );

        if let Err(error) = task.on_dead(&execution, now, &ops).await {
            tracing::error!(
                task_instance = %execution.task_instance,
                "dead-execution handler returned an error, execution stays claimed and will be \
                 retried next tick: {error:?}",
            );
            ctx.unexpected_error.increment(1);
        }
    }

    Ok(())
}
