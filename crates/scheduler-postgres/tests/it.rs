use chrono::{Duration, Utc};
use scheduler_core::{ExecutionRepository, NewExecution, TaskInstance};
use scheduler_postgres::PostgresRepository;
use sqlx::PgPool;

fn instance(name: &str) -> TaskInstance {
    TaskInstance::new(name, "1")
}

#[sqlx::test(migrator = "scheduler_postgres::MIGRATOR")]
async fn create_if_not_exists_is_idempotent(pool: PgPool) -> sqlx::Result<()> {
    let repo = PostgresRepository::new(pool);
    let now = Utc::now();

    let first = repo
        .create_if_not_exists(NewExecution::new(instance("x"), now))
        .await
        .unwrap();
    let second = repo
        .create_if_not_exists(NewExecution::new(instance("x"), now + Duration::seconds(5)))
        .await
        .unwrap();

    assert!(first);
    assert!(!second);

    Ok(())
}

#[sqlx::test(migrator = "scheduler_postgres::MIGRATOR")]
async fn pick_is_exclusive_across_schedulers(pool: PgPool) -> sqlx::Result<()> {
    let repo = PostgresRepository::new(pool);
    let now = Utc::now();
    repo.create_if_not_exists(NewExecution::new(instance("y"), now))
        .await
        .unwrap();

    let due = repo.get_due(now).await.unwrap();
    assert_eq!(due.len(), 1);

    let a = repo.pick(&due[0], "scheduler-a", now).await.unwrap();
    let b = repo.pick(&due[0], "scheduler-b", now).await.unwrap();

    assert!(a.is_some());
    assert!(b.is_none());
    assert_eq!(a.unwrap().picked_by.as_deref(), Some("scheduler-a"));

    Ok(())
}

#[sqlx::test(migrator = "scheduler_postgres::MIGRATOR")]
async fn reschedule_requires_ownership(pool: PgPool) -> sqlx::Result<()> {
    let repo = PostgresRepository::new(pool);
    let now = Utc::now();
    repo.create_if_not_exists(NewExecution::new(instance("z"), now))
        .await
        .unwrap();

    let due = repo.get_due(now).await.unwrap();
    let picked = repo.pick(&due[0], "owner", now).await.unwrap().unwrap();

    let err = repo
        .reschedule(&picked, "not-the-owner", now, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), scheduler_core::ErrorKind::NotOwner);

    repo.reschedule(&picked, "owner", now + Duration::seconds(30), None, None)
        .await
        .unwrap();

    let still_due = repo.get_due(now + Duration::seconds(30)).await.unwrap();
    assert_eq!(still_due.len(), 1);
    assert_eq!(still_due[0].execution_time, now + Duration::seconds(30));

    Ok(())
}

#[sqlx::test(migrator = "scheduler_postgres::MIGRATOR")]
async fn dead_detection_finds_stale_heartbeats(pool: PgPool) -> sqlx::Result<()> {
    let repo = PostgresRepository::new(pool);
    let now = Utc::now();
    repo.create_if_not_exists(NewExecution::new(instance("w"), now))
        .await
        .unwrap();

    let due = repo.get_due(now).await.unwrap();
    repo.pick(&due[0], "owner", now).await.unwrap();

    let dead = repo.get_old_executions(now + Duration::minutes(20)).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].task_instance, instance("w"));

    Ok(())
}

#[sqlx::test(migrator = "scheduler_postgres::MIGRATOR")]
async fn remove_requires_ownership(pool: PgPool) -> sqlx::Result<()> {
    let repo = PostgresRepository::new(pool);
    let now = Utc::now();
    repo.create_if_not_exists(NewExecution::new(instance("v"), now))
        .await
        .unwrap();

    let due = repo.get_due(now).await.unwrap();
    let picked = repo.pick(&due[0], "owner", now).await.unwrap().unwrap();

    let err = repo.remove(&picked, "impostor").await.unwrap_err();
    assert_eq!(err.kind(), scheduler_core::ErrorKind::NotOwner);

    repo.remove(&picked, "owner").await.unwrap();

    assert!(repo.get_due(now).await.unwrap().is_empty());

    Ok(())
}
