use std::sync::Arc;

use scheduler_core::{UnknownTaskPolicy, Waiter};

use crate::context::LoopContext;
use crate::pool::WorkerPool;
use crate::worker::run_execution;

/// Finds due unclaimed executions, claims them, and dispatches them to the
/// worker pool.
///
/// On each tick: if no worker slot is free, skip the scan entirely (there is
/// no point finding work this scheduler cannot currently run). Otherwise call
/// `get_due`, and for each due row in ascending `execution_time` order,
/// acquire a slot *before* attempting `pick` so that a slot is never
/// conceded to a claim this scheduler cannot service, then claim it. A lost
/// race (`pick` returns `Ok(None)`) releases the slot and moves to the next
/// row. Returns the pool back to the caller once shutdown is observed, so
/// the scheduler lifecycle can drain remaining in-flight executions.
pub(crate) async fn run(ctx: Arc<LoopContext>, waiter: Waiter, mut pool: WorkerPool) -> WorkerPool {
    loop {
        if ctx.state.is_shutting_down() {
            break;
        }

        ctx.free_slots_gauge.set(pool.available_permits() as f64);
        pool.reap_finished();

        if pool.available_permits() > 0 {
            if let Err(error) = tick(&ctx, &mut pool).await {
                tracing::error!("due-polling loop failed to scan for due executions: {error:?}");
                ctx.unexpected_error.increment(1);
            }
        }

        if waiter.wait().await {
            continue;
        }
    }

    pool
}

async fn tick(ctx: &Arc<LoopContext>, pool: &mut WorkerPool) -> anyhow::Result<()> {
    let now = ctx.clock.now();
    let due = ctx.repository.get_due(now).await?;

    for execution in due {
        if ctx.state.is_shutting_down() {
            break;
        }

        let Some(task) = ctx.registry.get(&execution.task_instance.task_name).cloned() else {
            match ctx.registry.policy() {
                UnknownTaskPolicy::WarnAndSkip => {
                    tracing::warn!(
                        task_instance = %execution.task_instance,
                        "skipping due execution: no task named `{}` is registered",
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

        let Some(permit) = pool.try_acquire_slot() else {
            break;
        };

        let picked = match ctx.repository.pick(&execution, &ctx.scheduler_name, ctx.clock.now()).await {
            Ok(picked) => picked,
            Err(error) => {
                drop(permit);
                return Err(error.into());
            }
        };

        let Some(claimed) = picked else {
            drop(permit);
            continue;
        };

        ctx.executing.insert(claimed.clone(), ctx.clock.now());

        let ctx = ctx.clone();
        let task = task.clone();
        let task_instance = claimed.task_instance.clone();

        pool.spawn(async move {
            let _permit = permit;
            run_execution(
                task,
                ctx.repository.clone(),
                ctx.clock.clone(),
                ctx.state.clone(),
                ctx.scheduler_name.clone(),
                claimed,
                ctx.heartbeat_interval,
                ctx.in_flight_gauge.clone(),
                ctx.unexpected_error.clone(),
            )
            .await;
            ctx.executing.remove(&task_instance);
        });

        if ctx.state.is_shutting_down() {
            break;
        }
    }

    Ok(())
}
