use std::sync::Arc;
use std::time::Duration;

use futures_concurrency::future::Join;
use scheduler_core::{
    Clock, ExecutionRepository, NewExecution, SchedulerState, SystemClock, Task, TaskInstance, TaskRegistry,
};

use crate::config::Config;
use crate::context::LoopContext;
use crate::error::SchedulerError;
use crate::executing::CurrentlyExecuting;
use crate::pool::WorkerPool;
use crate::{loop_dead, loop_due, loop_heartbeat};

/// Builds a [`Scheduler`] out of a repository, a task registry, and a
/// [`Config`].
pub struct SchedulerBuilder {
    repository: Arc<dyn ExecutionRepository>,
    config: Config,
    clock: Arc<dyn Clock>,
    registry: TaskRegistry,
    start_tasks: Vec<Arc<dyn Task>>,
}

impl SchedulerBuilder {
    pub fn new(repository: impl ExecutionRepository + 'static) -> Self {
        Self {
            repository: Arc::new(repository),
            config: Config::default(),
            clock: Arc::new(SystemClock),
            registry: TaskRegistry::builder().build(),
            start_tasks: Vec::new(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Inject a non-default clock. Intended for deterministic tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Mark `task` as one whose first occurrence should be seeded by
    /// [`Scheduler::start`], in registration order, under the instance id
    /// equal to the task's own name.
    ///
    /// `task` should typically also be registered on the [`TaskRegistry`]
    /// passed to [`SchedulerBuilder::registry`] so that it has a handler to
    /// run once its seeded execution comes due.
    pub fn start_task(mut self, task: Arc<dyn Task>) -> Self {
        self.start_tasks.push(task);
        self
    }

    pub async fn build(self) -> Result<Scheduler, SchedulerError> {
        if self.config.executor_threads == 0 {
            return Err(SchedulerError::new(anyhow::anyhow!(
                "executor_threads must be at least 1"
            )));
        }

        Ok(Scheduler {
            repository: self.repository,
            config: self.config,
            clock: self.clock,
            registry: Arc::new(self.registry),
            start_tasks: self.start_tasks,
            state: SchedulerState::new(),
            handles: None,
        })
    }
}

struct RunningLoops {
    due: tokio::task::JoinHandle<WorkerPool>,
    dead: tokio::task::JoinHandle<()>,
    heartbeat: tokio::task::JoinHandle<()>,
}

/// A running (or not-yet-started) scheduler: the due-polling,
/// dead-detection, and heartbeat loops plus the worker pool that executes
/// claimed work.
pub struct Scheduler {
    repository: Arc<dyn ExecutionRepository>,
    config: Config,
    clock: Arc<dyn Clock>,
    registry: Arc<TaskRegistry>,
    start_tasks: Vec<Arc<dyn Task>>,
    state: SchedulerState,
    handles: Option<RunningLoops>,
}

impl Scheduler {
    pub fn builder(repository: impl ExecutionRepository + 'static) -> SchedulerBuilder {
        SchedulerBuilder::new(repository)
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Schedule a new task instance to run at `execution_time`, iff one
    /// doesn't already exist. Exposed for callers seeding work outside of
    /// `start_task` closures.
    pub async fn schedule(
        &self,
        execution: NewExecution,
    ) -> Result<bool, scheduler_core::RepositoryError> {
        self.repository.create_if_not_exists(execution).await
    }

    /// Seed the first occurrence of every registered on-startup task (a
    /// no-op if one is already scheduled), then launch the three control
    /// loops, each on its own `tokio::spawn`ed task.
    ///
    /// A start task's instance id is its own task name, so a given task may
    /// only be registered once as a start task; this mirrors the common
    /// convention for singleton recurring system tasks.
    pub async fn start(&mut self) {
        self.state.mark_running();

        let now = self.clock.now();
        for task in &self.start_tasks {
            let instance = NewExecution::new(TaskInstance::new(task.name(), task.name()), now);
            if let Err(error) = self.repository.create_if_not_exists(instance).await {
                tracing::error!(task = task.name(), "failed to seed start task: {error:?}");
            }
        }

        let executing = CurrentlyExecuting::new();
        let unexpected_error = self.config.stats_registry.clone();
        let in_flight_gauge = crate::metrics::in_flight_gauge(&self.config.scheduler_name);
        let free_slots_gauge = crate::metrics::free_slots_gauge(&self.config.scheduler_name);

        let ctx = Arc::new(LoopContext {
            repository: self.repository.clone(),
            registry: self.registry.clone(),
            clock: self.clock.clone(),
            state: self.state.clone(),
            scheduler_name: self.config.scheduler_name.clone(),
            executing,
            heartbeat_interval: self.config.heartbeat_interval,
            unexpected_error,
            in_flight_gauge,
            free_slots_gauge,
        });

        let pool = WorkerPool::new(self.config.executor_threads);
        let due_waiter = scheduler_core::Waiter::new(self.config.polling_interval, self.clock.clone(), self.state.clone());
        let dead_waiter = scheduler_core::Waiter::new(
            self.config.dead_detection_interval(),
            self.clock.clone(),
            self.state.clone(),
        );
        let heartbeat_waiter =
            scheduler_core::Waiter::new(self.config.heartbeat_interval, self.clock.clone(), self.state.clone());
        let dead_threshold = chrono::Duration::from_std(self.config.dead_threshold())
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));

        let due = tokio::spawn(loop_due::run(ctx.clone(), due_waiter, pool));
        let dead = tokio::spawn(loop_dead::run(ctx.clone(), dead_waiter, dead_threshold));
        let heartbeat = tokio::spawn(loop_heartbeat::run(ctx, heartbeat_waiter));

        self.handles = Some(RunningLoops { due, dead, heartbeat });
    }

    /// Signal shutdown, await the three control loops (each bounded by
    /// `loop_shutdown_grace`), then drain in-flight worker-pool executions
    /// (bounded by `executor_shutdown_grace`).
    ///
    /// `mark_shutting_down` wakes every loop's `Waiter` immediately (they
    /// race their sleep against `SchedulerState`, not just their own
    /// `wake()`), so none of them wait out a full tick interval here.
    pub async fn stop(mut self) {
        self.state.mark_shutting_down();

        let Some(handles) = self.handles.take() else {
            self.state.mark_stopped();
            return;
        };

        let grace = self.config.loop_shutdown_grace;

        let (due, dead, heartbeat) = (
            await_with_grace("due-polling", handles.due, grace),
            await_with_grace_unit("dead-detection", handles.dead, grace),
            await_with_grace_unit("heartbeat", handles.heartbeat, grace),
        )
            .join()
            .await;

        let _ = (dead, heartbeat);

        if let Some(mut pool) = due {
            pool.drain(self.config.executor_shutdown_grace).await;
        }

        self.state.mark_stopped();
    }
}

async fn await_with_grace(name: &str, handle: tokio::task::JoinHandle<WorkerPool>, grace: Duration) -> Option<WorkerPool> {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(pool)) => Some(pool),
        Ok(Err(error)) => {
            tracing::error!("{name} loop panicked: {error}");
            None
        }
        Err(_) => {
            tracing::warn!(
                grace = %humantime::Duration::from(grace),
                "{name} loop did not stop within its shutdown grace period",
            );
            None
        }
    }
}

async fn await_with_grace_unit(name: &str, handle: tokio::task::JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(())) => (),
        Ok(Err(error)) => tracing::error!("{name} loop panicked: {error}"),
        Err(_) => tracing::warn!(
            grace = %humantime::Duration::from(grace),
            "{name} loop did not stop within its shutdown grace period",
        ),
    }
}

/// A cheaply-cloned reference to a running [`Scheduler`]'s shared state.
///
/// Handed out by [`Scheduler::handle`] so user code (e.g. a signal handler)
/// can request shutdown without owning the scheduler itself.
#[derive(Clone)]
pub struct SchedulerHandle {
    state: SchedulerState,
}

impl SchedulerHandle {
    /// Mark the scheduler shutting down. Every control loop's `Waiter` races
    /// its sleep against this same `SchedulerState`, so each one observes the
    /// request within one scheduling round-trip rather than on its next full
    /// tick — there is no separate "wake the loops" step to call.
    pub fn request_shutdown(&self) {
        self.state.mark_shutting_down();
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}
