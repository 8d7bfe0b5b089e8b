use gigcore_core::error::CoreError;
use gigcore_core::ids::{DisputeId, EscrowId, TaskId, UserId};
use gigcore_core::model::*;
use gigcore_core::money::Cents;
use sqlx::Row;

use crate::pool::{Store, Txn};
use crate::rowconv;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn row_to_dispute(row: &sqlx::postgres::PgRow) -> Result<Dispute, CoreError> {
    Ok(Dispute {
        id: DisputeId::from_uuid(row.try_get("id").map_err(db_err)?),
        task_id: TaskId::from_uuid(row.try_get("task_id").map_err(db_err)?),
        escrow_id: EscrowId::from_uuid(row.try_get("escrow_id").map_err(db_err)?),
        initiator_id: UserId::from_uuid(row.try_get("initiator_id").map_err(db_err)?),
        poster_id: UserId::from_uuid(row.try_get("poster_id").map_err(db_err)?),
        worker_id: UserId::from_uuid(row.try_get("worker_id").map_err(db_err)?),
        state: rowconv::dispute_state::from_str(row.try_get("state").map_err(db_err)?),
        outcome: row
            .try_get::<Option<String>, _>("outcome")
            .map_err(db_err)?
            .map(|s| rowconv::dispute_outcome::from_str(&s)),
        refund_amount: row.try_get::<Option<i64>, _>("refund_amount_cents").map_err(db_err)?.map(Cents),
        release_amount: row.try_get::<Option<i64>, _>("release_amount_cents").map_err(db_err)?.map(Cents),
        version: row.try_get("version").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

impl Store {
    pub async fn get_dispute(&self, id: DisputeId) -> Result<Option<Dispute>, CoreError> {
        let row = sqlx::query("SELECT * FROM disputes WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_dispute).transpose()
    }
}

pub async fn insert_dispute(txn: &mut Txn, dispute: &Dispute) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO disputes (id, task_id, escrow_id, initiator_id, poster_id, worker_id,
            state, version, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
    )
    .bind(dispute.id.as_uuid())
    .bind(dispute.task_id.as_uuid())
    .bind(dispute.escrow_id.as_uuid())
    .bind(dispute.initiator_id.as_uuid())
    .bind(dispute.poster_id.as_uuid())
    .bind(dispute.worker_id.as_uuid())
    .bind(rowconv::dispute_state::to_str(dispute.state))
    .bind(dispute.version)
    .bind(dispute.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn lock_dispute_for_update(txn: &mut Txn, id: DisputeId) -> Result<Option<Dispute>, CoreError> {
    let row = sqlx::query("SELECT * FROM disputes WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_dispute).transpose()
}

pub async fn update_dispute(
    txn: &mut Txn,
    dispute: &Dispute,
    expected_version: i64,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "UPDATE disputes SET state = $2, outcome = $3, refund_amount_cents = $4,
            release_amount_cents = $5, version = version + 1
         WHERE id = $1 AND version = $6",
    )
    .bind(dispute.id.as_uuid())
    .bind(rowconv::dispute_state::to_str(dispute.state))
    .bind(dispute.outcome.map(rowconv::dispute_outcome::to_str))
    .bind(dispute.refund_amount.map(|c| c.0))
    .bind(dispute.release_amount.map(|c| c.0))
    .bind(expected_version)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}
