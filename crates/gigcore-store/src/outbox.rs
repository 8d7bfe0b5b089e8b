use chrono::{DateTime, Utc};
use gigcore_core::error::CoreError;
use gigcore_core::ids::OutboxId;
use gigcore_core::model::{OutboxQueue, OutboxRow, OutboxStatus};
use sqlx::Row;

use crate::pool::{Store, Txn};
use crate::rowconv;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn row_to_outbox(row: &sqlx::postgres::PgRow) -> Result<OutboxRow, CoreError> {
    Ok(OutboxRow {
        id: OutboxId::from_uuid(row.try_get("id").map_err(db_err)?),
        event_type: row.try_get("event_type").map_err(db_err)?,
        aggregate_type: row.try_get("aggregate_type").map_err(db_err)?,
        aggregate_id: row.try_get("aggregate_id").map_err(db_err)?,
        event_version: row.try_get("event_version").map_err(db_err)?,
        idempotency_key: row.try_get("idempotency_key").map_err(db_err)?,
        payload: row.try_get("payload").map_err(db_err)?,
        queue: rowconv::outbox_queue::from_str(row.try_get("queue").map_err(db_err)?),
        status: rowconv::outbox_status::from_str(row.try_get("status").map_err(db_err)?),
        attempts: row.try_get("attempts").map_err(db_err)?,
        next_attempt_at: row.try_get("next_attempt_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

/// Writer contract (§4.B): call this in the same transaction as the domain
/// write it accompanies. Returns `false` if the idempotency key already
/// existed (the domain event was already recorded by an earlier attempt).
pub async fn append_outbox_row(txn: &mut Txn, row: &OutboxRow) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "INSERT INTO outbox (id, event_type, aggregate_type, aggregate_id, event_version,
            idempotency_key, payload, queue, status, attempts, next_attempt_at, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
         ON CONFLICT (idempotency_key) DO NOTHING",
    )
    .bind(row.id.as_uuid())
    .bind(&row.event_type)
    .bind(&row.aggregate_type)
    .bind(&row.aggregate_id)
    .bind(row.event_version)
    .bind(&row.idempotency_key)
    .bind(&row.payload)
    .bind(rowconv::outbox_queue::to_str(row.queue))
    .bind(rowconv::outbox_status::to_str(row.status))
    .bind(row.attempts)
    .bind(row.next_attempt_at)
    .bind(row.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}

impl Store {
    /// Dispatcher contract (§4.B): select pending rows due for (re)delivery,
    /// skipping rows locked by another dispatcher instance, and mark them
    /// enqueued. At-least-once: it is safe to crash between this call
    /// returning and the worker finishing — the row stays `enqueued` and a
    /// recovery sweep (not modeled here) would re-surface it.
    pub async fn claim_pending_outbox_rows(
        &self,
        queue: OutboxQueue,
        limit: i64,
    ) -> Result<Vec<OutboxRow>, CoreError> {
        let mut txn = self.pool().begin().await.map_err(db_err)?;
        let rows = sqlx::query(
            "SELECT * FROM outbox
             WHERE queue = $1 AND status = 'pending' AND next_attempt_at <= now()
             ORDER BY created_at
             FOR UPDATE SKIP LOCKED
             LIMIT $2",
        )
        .bind(rowconv::outbox_queue::to_str(queue))
        .bind(limit)
        .fetch_all(&mut *txn)
        .await
        .map_err(db_err)?;

        let claimed: Vec<OutboxRow> = rows.iter().map(row_to_outbox).collect::<Result<_, _>>()?;
        for row in &claimed {
            sqlx::query("UPDATE outbox SET status = 'enqueued' WHERE id = $1")
                .bind(row.id.as_uuid())
                .execute(&mut *txn)
                .await
                .map_err(db_err)?;
        }
        txn.commit().await.map_err(db_err)?;
        Ok(claimed)
    }

    pub async fn mark_outbox_processed(&self, id: OutboxId) -> Result<(), CoreError> {
        sqlx::query("UPDATE outbox SET status = 'processed' WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Retryable failure: bump `attempts`, reschedule with backoff, and flip
    /// back to `pending`; once `attempts` reaches the cap, mark `failed` for
    /// operator triage instead (§5).
    pub async fn mark_outbox_retry_or_failed(
        &self,
        id: OutboxId,
        attempts: i32,
        max_attempts: i32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if attempts >= max_attempts {
            sqlx::query("UPDATE outbox SET status = 'failed', attempts = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(attempts)
                .execute(self.pool())
                .await
                .map_err(db_err)?;
        } else {
            sqlx::query(
                "UPDATE outbox SET status = 'pending', attempts = $2, next_attempt_at = $3 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(attempts)
            .bind(next_attempt_at)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }
}
