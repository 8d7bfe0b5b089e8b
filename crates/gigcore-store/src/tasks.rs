use chrono::{DateTime, Utc};
use gigcore_core::error::CoreError;
use gigcore_core::ids::{TaskId, UserId};
use gigcore_core::model::*;
use gigcore_core::money::Cents;
use sqlx::Row;

use crate::pool::{Store, Txn};
use crate::rowconv;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<Task, CoreError> {
    Ok(Task {
        id: TaskId::from_uuid(row.try_get("id").map_err(db_err)?),
        poster_id: UserId::from_uuid(row.try_get("poster_id").map_err(db_err)?),
        worker_id: row
            .try_get::<Option<uuid::Uuid>, _>("worker_id")
            .map_err(db_err)?
            .map(UserId::from_uuid),
        price: Cents(row.try_get("price_cents").map_err(db_err)?),
        category: row.try_get("category").map_err(db_err)?,
        mode: rowconv::task_mode::from_str(row.try_get("mode").map_err(db_err)?),
        instant_mode: row.try_get("instant_mode").map_err(db_err)?,
        risk_level: rowconv::risk_level::from_str(row.try_get("risk_level").map_err(db_err)?),
        lifecycle_state: rowconv::lifecycle_state::from_str(row.try_get("lifecycle_state").map_err(db_err)?),
        progress_state: rowconv::progress_state::from_str(row.try_get("progress_state").map_err(db_err)?),
        completed_at: row.try_get("completed_at").map_err(db_err)?,
        version: row.try_get("version").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

/// Snapshot of the three metrics the causal-impact analyzer compares between
/// a treated window and a matched control window (§4.H). All three are
/// plain ratios over tasks created in the window; there is no dedicated
/// metrics table, so this is computed directly from `tasks`/`disputes`.
#[derive(Clone, Copy, Debug)]
pub struct TaskMetricsSnapshot {
    pub fill_rate: f64,
    pub completion_rate: f64,
    pub dispute_rate: f64,
}

impl Store {
    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>, CoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    /// Tasks of `category` created within the window, windowed the same way
    /// the analyzer windows a correction's treated/control periods. Zone is
    /// deliberately not a filter: `tasks` carries no zone column, only
    /// category; zone-scoped corrections are matched against other
    /// corrections by zone, but the underlying metric is category-windowed.
    pub async fn task_metrics_for_category(
        &self,
        category: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<TaskMetricsSnapshot, CoreError> {
        let (created, filled, completed): (i64, i64, i64) = sqlx::query_as(
            "SELECT count(*),
                    count(*) FILTER (WHERE worker_id IS NOT NULL),
                    count(*) FILTER (WHERE lifecycle_state = 'completed')
             FROM tasks
             WHERE category = $1 AND created_at BETWEEN $2 AND $3",
        )
        .bind(category)
        .bind(window_start)
        .bind(window_end)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        let disputed: i64 = sqlx::query_scalar(
            "SELECT count(DISTINCT d.task_id)
             FROM disputes d
             JOIN tasks t ON t.id = d.task_id
             WHERE t.category = $1 AND t.created_at BETWEEN $2 AND $3",
        )
        .bind(category)
        .bind(window_start)
        .bind(window_end)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        if created == 0 {
            return Ok(TaskMetricsSnapshot {
                fill_rate: 0.0,
                completion_rate: 0.0,
                dispute_rate: 0.0,
            });
        }
        Ok(TaskMetricsSnapshot {
            fill_rate: filled as f64 / created as f64,
            completion_rate: completed as f64 / created as f64,
            dispute_rate: disputed as f64 / created as f64,
        })
    }
}

pub async fn insert_task(txn: &mut Txn, task: &Task) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO tasks (id, poster_id, worker_id, price_cents, category, mode, instant_mode,
            risk_level, lifecycle_state, progress_state, completed_at, version, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
    )
    .bind(task.id.as_uuid())
    .bind(task.poster_id.as_uuid())
    .bind(task.worker_id.map(|w| w.as_uuid()))
    .bind(task.price.0)
    .bind(&task.category)
    .bind(rowconv::task_mode::to_str(task.mode))
    .bind(task.instant_mode)
    .bind(rowconv::risk_level::to_str(task.risk_level))
    .bind(rowconv::lifecycle_state::to_str(task.lifecycle_state))
    .bind(rowconv::progress_state::to_str(task.progress_state))
    .bind(task.completed_at)
    .bind(task.version)
    .bind(task.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn lock_task_for_update(txn: &mut Txn, id: TaskId) -> Result<Option<Task>, CoreError> {
    let row = sqlx::query("SELECT * FROM tasks WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_task).transpose()
}

/// Conditional update on `version`; zero rows affected means a concurrent
/// writer won the race and the caller should surface `VersionConflict`.
pub async fn update_task_state(
    txn: &mut Txn,
    task: &Task,
    expected_version: i64,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "UPDATE tasks SET worker_id = $2, lifecycle_state = $3, progress_state = $4,
            completed_at = $5, version = version + 1
         WHERE id = $1 AND version = $6",
    )
    .bind(task.id.as_uuid())
    .bind(task.worker_id.map(|w| w.as_uuid()))
    .bind(rowconv::lifecycle_state::to_str(task.lifecycle_state))
    .bind(rowconv::progress_state::to_str(task.progress_state))
    .bind(task.completed_at)
    .bind(expected_version)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}

/// I3 support: true if `task_id` has exactly one proof with state=ACCEPTED.
pub async fn has_accepted_proof(txn: &mut Txn, task_id: TaskId) -> Result<bool, CoreError> {
    let row = sqlx::query("SELECT 1 FROM proofs WHERE task_id = $1 AND state = 'accepted'")
        .bind(task_id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(row.is_some())
}
