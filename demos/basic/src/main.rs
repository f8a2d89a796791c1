use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scheduler_core::{ExecutionContext, ExecutionRepository, NewExecution, Task, TaskInstance, TaskRegistry};
use scheduler_memory::MemoryRepository;
use scheduler_runtime::{Config, Scheduler};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

struct GreetTask;

#[async_trait]
impl Task for GreetTask {
    fn name(&self) -> &str {
        "greet"
    }

    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        tracing::info!(instance = %ctx.task_instance, "hello from the scheduler!");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let repository = MemoryRepository::new();
    repository
        .create_if_not_exists(NewExecution::new(TaskInstance::new("greet", "1"), Utc::now()))
        .await?;

    let registry = TaskRegistry::builder().task(Arc::new(GreetTask)).build();

    let mut config = Config::default();
    config.polling_interval = Duration::from_secs(1);
    config.executor_threads = 4;

    let mut scheduler = Scheduler::builder(repository)
        .config(config)
        .registry(registry)
        .build()
        .await?;

    let handle = scheduler.handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
        handle.request_shutdown();
    });

    scheduler.start().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    scheduler.stop().await;

    Ok(())
}
