use chrono::{DateTime, Utc};
use scheduler_core::{Execution, TaskInstance};

/// Mirror of the `scheduler_execution` table, used as the target of every
/// `query_as` in this crate so field order in `SELECT`/`RETURNING` clauses is
/// checked against a real type instead of a loose tuple.
#[derive(sqlx::FromRow)]
pub(crate) struct ExecutionRow {
    pub task_name: String,
    pub instance_id: String,
    pub execution_time: DateTime<Utc>,
    pub picked: bool,
    pub picked_by: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub version: i64,
}

impl ExecutionRow {
    pub(crate) fn into_execution(self) -> Execution {
        Execution {
            task_instance: TaskInstance::new(self.task_name, self.instance_id),
            execution_time: self.execution_time,
            picked: self.picked,
            picked_by: self.picked_by,
            last_heartbeat: self.last_heartbeat,
            last_success: self.last_success,
            last_failure: self.last_failure,
            version: self.version,
        }
    }
}
