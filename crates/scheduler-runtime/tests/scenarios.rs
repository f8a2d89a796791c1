use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{Clock, ExecutionContext, NewExecution, Ops, Outcome, Task, TaskInstance, TaskRegistry, UnknownTaskPolicy};
use scheduler_memory::MemoryRepository;
use scheduler_runtime::{Config, Scheduler};

/// A `Clock` whose `now()` tracks tokio's (paused, manually-advanced)
/// virtual time, so `tokio::time::advance` moves both the executor's
/// schedule and what the scheduler believes the wall clock to be.
struct TestClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TestClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Utc::now(),
            start: tokio::time::Instant::now(),
        })
    }
}

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.start);
        self.base + chrono::Duration::from_std(elapsed).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

struct RecordingTask {
    name: String,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Task for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &ExecutionContext) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A task whose every execution fails, used to exercise dead-execution
/// recovery when a completion handler never runs because the row stays
/// claimed.
struct StallingTask {
    name: String,
}

#[async_trait]
impl Task for StallingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        // Never completes within the test: sleeps far longer than the
        // heartbeat interval under test, simulating a worker that vanished.
        ctx.clock.sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// A task that finishes successfully but whose completion handler always
/// fails, used to exercise dead-execution recovery of a claim that execution
/// itself never stalled on.
struct FailingCompleteTask {
    name: String,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Task for FailingCompleteTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &ExecutionContext) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_complete(&self, _outcome: Outcome, _now: DateTime<Utc>, _ops: &Ops) -> anyhow::Result<()> {
        anyhow::bail!("completion handler deliberately fails")
    }
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn single_due_execution_is_claimed_and_run() {
    let clock = TestClock::new();
    let repo = MemoryRepository::new();
    let now = clock.now();
    repo.create_if_not_exists(NewExecution::new(TaskInstance::new("x", "1"), now))
        .await
        .unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let task = Arc::new(RecordingTask {
        name: "x".to_owned(),
        runs: runs.clone(),
    });
    let registry = TaskRegistry::builder().task(task).build();

    let mut config = Config::default();
    config.polling_interval = Duration::from_millis(10);
    config.heartbeat_interval = Duration::from_secs(60);
    config.scheduler_name = "test-scheduler".into();

    let mut scheduler = Scheduler::builder(repo)
        .config(config)
        .clock(clock.clone())
        .registry(registry)
        .build()
        .await
        .unwrap();

    scheduler.start().await;

    tokio::time::advance(Duration::from_millis(20)).await;
    settle().await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn slot_exhaustion_defers_second_row_to_next_tick() {
    let clock = TestClock::new();
    let repo = MemoryRepository::new();
    let now = clock.now();

    repo.create_if_not_exists(NewExecution::new(TaskInstance::new("a", "1"), now))
        .await
        .unwrap();
    repo.create_if_not_exists(NewExecution::new(
        TaskInstance::new("b", "1"),
        now + chrono::Duration::milliseconds(5),
    ))
    .await
    .unwrap();

    let a_runs = Arc::new(AtomicUsize::new(0));
    let b_runs = Arc::new(AtomicUsize::new(0));
    let registry = TaskRegistry::builder()
        .task(Arc::new(RecordingTask {
            name: "a".to_owned(),
            runs: a_runs.clone(),
        }))
        .task(Arc::new(RecordingTask {
            name: "b".to_owned(),
            runs: b_runs.clone(),
        }))
        .build();

    let mut config = Config::default();
    config.executor_threads = 1;
    config.polling_interval = Duration::from_millis(10);
    config.heartbeat_interval = Duration::from_secs(60);

    let mut scheduler = Scheduler::builder(repo)
        .config(config)
        .clock(clock.clone())
        .registry(registry)
        .build()
        .await
        .unwrap();

    scheduler.start().await;

    tokio::time::advance(Duration::from_millis(15)).await;
    settle().await;

    assert_eq!(a_runs.load(Ordering::SeqCst), 1);
    assert_eq!(b_runs.load(Ordering::SeqCst), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn dead_detection_reclaims_a_stalled_claim() {
    let clock = TestClock::new();
    let repo = MemoryRepository::new();
    let snapshot_repo = repo.clone();
    let now = clock.now();
    repo.create_if_not_exists(NewExecution::new(TaskInstance::new("z", "1"), now))
        .await
        .unwrap();

    let registry = TaskRegistry::builder()
        .task(Arc::new(StallingTask { name: "z".to_owned() }))
        .build();

    let mut config = Config::default();
    config.polling_interval = Duration::from_millis(10);
    config.heartbeat_interval = Duration::from_millis(100);

    let mut scheduler = Scheduler::builder(repo)
        .config(config)
        .clock(clock.clone())
        .registry(registry)
        .build()
        .await
        .unwrap();

    scheduler.start().await;

    // Let the row be claimed, then run far past the dead threshold (4x
    // heartbeat_interval) without the stalled task ever completing.
    tokio::time::advance(Duration::from_millis(50)).await;
    settle().await;

    let claimed = snapshot_repo.snapshot();
    assert_eq!(claimed.len(), 1);
    assert!(claimed[0].picked, "the row should have been claimed before it stalled");

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;

    scheduler.stop().await;

    let recovered = snapshot_repo.snapshot();
    assert_eq!(recovered.len(), 1);
    assert!(!recovered[0].picked, "dead detection must free the stalled claim");
    assert!(
        recovered[0].execution_time > now,
        "the dead-execution handler must reschedule the row into the future",
    );
}

#[tokio::test(start_paused = true)]
async fn completion_handler_failure_leaves_row_claimed_for_dead_detection() {
    let clock = TestClock::new();
    let repo = MemoryRepository::new();
    let snapshot_repo = repo.clone();
    let now = clock.now();
    repo.create_if_not_exists(NewExecution::new(TaskInstance::new("c", "1"), now))
        .await
        .unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let registry = TaskRegistry::builder()
        .task(Arc::new(FailingCompleteTask {
            name: "c".to_owned(),
            runs: runs.clone(),
        }))
        .build();

    let mut config = Config::default();
    config.polling_interval = Duration::from_millis(10);
    config.heartbeat_interval = Duration::from_millis(100);

    let mut scheduler = Scheduler::builder(repo)
        .config(config)
        .clock(clock.clone())
        .registry(registry)
        .build()
        .await
        .unwrap();

    scheduler.start().await;

    tokio::time::advance(Duration::from_millis(20)).await;
    settle().await;

    assert_eq!(runs.load(Ordering::SeqCst), 1, "execute should have run exactly once");

    let claimed = snapshot_repo.snapshot();
    assert_eq!(claimed.len(), 1);
    assert!(
        claimed[0].picked,
        "a failing completion handler must leave the row claimed rather than removing it",
    );

    // Past the dead threshold (4x heartbeat_interval), dead detection should
    // recover the row via the default `on_dead` handler, exactly as it would
    // for a task that never returned from `execute` at all.
    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;

    scheduler.stop().await;

    assert_eq!(
        runs.load(Ordering::SeqCst),
        1,
        "dead detection must not re-run execute; it only recovers the claim",
    );

    let recovered = snapshot_repo.snapshot();
    assert_eq!(recovered.len(), 1);
    assert!(!recovered[0].picked, "dead detection must free the stalled claim");
    assert!(
        recovered[0].execution_time > now,
        "the dead-execution handler must reschedule the row into the future",
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_task_is_skipped_under_default_policy() {
    let clock = TestClock::new();
    let repo = MemoryRepository::new();
    let now = clock.now();
    repo.create_if_not_exists(NewExecution::new(TaskInstance::new("ghost", "1"), now))
        .await
        .unwrap();

    // No task named "ghost" is registered.
    let registry = TaskRegistry::builder().build();

    let mut config = Config::default();
    config.polling_interval = Duration::from_millis(10);
    config.heartbeat_interval = Duration::from_secs(60);

    let mut scheduler = Scheduler::builder(repo)
        .config(config)
        .clock(clock.clone())
        .registry(registry)
        .build()
        .await
        .unwrap();

    scheduler.start().await;

    tokio::time::advance(Duration::from_millis(50)).await;
    settle().await;

    // No panic, no crash: the row is simply left alone under WarnAndSkip.
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_task_blocks_the_tick_under_fail_policy() {
    let clock = TestClock::new();
    let repo = MemoryRepository::new();
    let now = clock.now();

    // "ghost" is unregistered and due first; "known" is registered and due
    // just after it. `get_due` returns rows in ascending `execution_time`
    // order, so under `Fail` the scan bails on "ghost" every tick before it
    // ever reaches "known".
    repo.create_if_not_exists(NewExecution::new(TaskInstance::new("ghost", "1"), now))
        .await
        .unwrap();
    repo.create_if_not_exists(NewExecution::new(
        TaskInstance::new("known", "1"),
        now + chrono::Duration::milliseconds(5),
    ))
    .await
    .unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let registry = TaskRegistry::builder()
        .task(Arc::new(RecordingTask {
            name: "known".to_owned(),
            runs: runs.clone(),
        }))
        .unknown_task_policy(UnknownTaskPolicy::Fail)
        .build();

    let mut config = Config::default();
    config.polling_interval = Duration::from_millis(10);
    config.heartbeat_interval = Duration::from_secs(60);

    let mut scheduler = Scheduler::builder(repo)
        .config(config)
        .clock(clock.clone())
        .registry(registry)
        .build()
        .await
        .unwrap();

    scheduler.start().await;

    tokio::time::advance(Duration::from_millis(100)).await;
    settle().await;

    scheduler.stop().await;

    assert_eq!(
        runs.load(Ordering::SeqCst),
        0,
        "the scan must bail on the unknown task before reaching the row behind it",
    );
}
