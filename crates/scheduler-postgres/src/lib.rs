//! Durable `sqlx`-backed [`ExecutionRepository`].
//!
//! Every mutating operation is a single `UPDATE`/`INSERT` guarded by the
//! row's `version` column (or, for `create_if_not_exists`, by the primary key
//! uniqueness constraint) so that no row lock is ever held across a network
//! round-trip or across user code, matching the optimistic-concurrency
//! contract every [`ExecutionRepository`] implementation must honor.
//!
//! Queries are written with [`sqlx::query_as`] against a plain connection
//! pool rather than the compile-time-checked `sqlx::query!` macros, since the
//! latter require a live database reachable at build time; this crate is
//! expected to build in CI environments without one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{Execution, ExecutionRepository, NewExecution, RepositoryError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod row;

use self::row::ExecutionRow;

/// The schema migrations needed by [`PostgresRepository`].
///
/// Callers are expected to run these once (e.g. at process startup) against
/// the pool they hand to [`PostgresRepository::new`):
///
/// ```ignore
/// scheduler_postgres::MIGRATOR.run(&pool).await?;
/// ```
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// A durable [`ExecutionRepository`] backed by Postgres.
///
/// Does not own or size the connection pool: the caller supplies one sized
/// for its worker pool (`executor_threads + 3` is a reasonable floor, to
/// leave headroom for the three control loops alongside in-flight task
/// bodies that also share the pool).
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convenience constructor that connects and applies pending migrations
    /// in one step. Most callers that manage their own pool (and their own
    /// migration timing across a fleet) should use [`PostgresRepository::new`]
    /// instead.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(RepositoryError::store)?;

        MIGRATOR.run(&pool).await.map_err(RepositoryError::store)?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ExecutionRepository for PostgresRepository {
    async fn create_if_not_exists(&self, execution: NewExecution) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO scheduler_execution (task_name, instance_id, execution_time)
             VALUES ($1, $2, $3)
             ON CONFLICT (task_name, instance_id) DO NOTHING",
        )
        .bind(&execution.task_instance.task_name)
        .bind(&execution.task_instance.instance_id)
        .bind(execution.execution_time)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::store)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_due(&self, now: DateTime<Utc>) -> Result<Vec<Execution>, RepositoryError> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            "SELECT task_name, instance_id, execution_time, picked, picked_by,
                    last_heartbeat, last_success, last_failure, version
               FROM scheduler_execution
              WHERE NOT picked AND execution_time <= $1
              ORDER BY execution_time ASC, task_name ASC, instance_id ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::store)?;

        Ok(rows.into_iter().map(ExecutionRow::into_execution).collect())
    }

    async fn pick(
        &self,
        execution: &Execution,
        scheduler_name: &str,
        time_picked: DateTime<Utc>,
    ) -> Result<Option<Execution>, RepositoryError> {
        let row: Option<ExecutionRow> = sqlx::query_as(
            "UPDATE scheduler_execution
                SET picked = TRUE,
                    picked_by = $1,
                    last_heartbeat = $2,
                    version = version + 1
              WHERE task_name = $3 AND instance_id = $4
                AND NOT picked AND version = $5
          RETURNING task_name, instance_id, execution_time, picked, picked_by,
                    last_heartbeat, last_success, last_failure, version",
        )
        .bind(scheduler_name)
        .bind(time_picked)
        .bind(&execution.task_instance.task_name)
        .bind(&execution.task_instance.instance_id)
        .bind(execution.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::store)?;

        Ok(row.map(ExecutionRow::into_execution))
    }

    async fn update_heartbeat(
        &self,
        execution: &Execution,
        scheduler_name: &str,
        t: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE scheduler_execution
                SET last_heartbeat = $1
              WHERE task_name = $2 AND instance_id = $3
                AND picked AND picked_by = $4 AND version = $5",
        )
        .bind(t)
        .bind(&execution.task_instance.task_name)
        .bind(&execution.task_instance.instance_id)
        .bind(scheduler_name)
        .bind(execution.version)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::store)?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                task_instance = %execution.task_instance,
                "heartbeat no-op: execution is no longer owned by this scheduler",
            );
        }

        Ok(())
    }

    async fn reschedule(
        &self,
        execution: &Execution,
        scheduler_name: &str,
        next_execution_time: DateTime<Utc>,
        last_success: Option<DateTime<Utc>>,
        last_failure: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE scheduler_execution
                SET picked = FALSE,
                    picked_by = NULL,
                    last_heartbeat = NULL,
                    execution_time = $1,
                    last_success = COALESCE($2, last_success),
                    last_failure = COALESCE($3, last_failure),
                    version = version + 1
              WHERE task_name = $4 AND instance_id = $5
                AND picked AND picked_by = $6 AND version = $7",
        )
        .bind(next_execution_time)
        .bind(last_success)
        .bind(last_failure)
        .bind(&execution.task_instance.task_name)
        .bind(&execution.task_instance.instance_id)
        .bind(scheduler_name)
        .bind(execution.version)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::store)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_owner());
        }

        Ok(())
    }

    async fn remove(&self, execution: &Execution, scheduler_name: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM scheduler_execution
              WHERE task_name = $1 AND instance_id = $2
                AND picked AND picked_by = $3 AND version = $4",
        )
        .bind(&execution.task_instance.task_name)
        .bind(&execution.task_instance.instance_id)
        .bind(scheduler_name)
        .bind(execution.version)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::store)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_owner());
        }

        Ok(())
    }

    async fn get_old_executions(&self, older_than: DateTime<Utc>) -> Result<Vec<Execution>, RepositoryError> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            "SELECT task_name, instance_id, execution_time, picked, picked_by,
                    last_heartbeat, last_success, last_failure, version
               FROM scheduler_execution
              WHERE picked AND last_heartbeat <= $1
              ORDER BY execution_time ASC",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::store)?;

        Ok(rows.into_iter().map(ExecutionRow::into_execution).collect())
    }

    async fn get_executions_failing_longer_than(
        &self,
        duration: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Execution>, RepositoryError> {
        let threshold = now - duration;
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            "SELECT task_name, instance_id, execution_time, picked, picked_by,
                    last_heartbeat, last_success, last_failure, version
               FROM scheduler_execution
              WHERE last_failure IS NOT NULL
                AND last_failure <= $1
                AND (last_success IS NULL OR last_success < last_failure)
              ORDER BY last_failure ASC",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::store)?;

        Ok(rows.into_iter().map(ExecutionRow::into_execution).collect())
    }
}
