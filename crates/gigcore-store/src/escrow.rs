use gigcore_core::error::CoreError;
use gigcore_core::ids::{EscrowId, TaskId};
use gigcore_core::model::*;
use gigcore_core::money::Cents;
use sqlx::Row;

use crate::pool::{Store, Txn};
use crate::rowconv;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn row_to_escrow(row: &sqlx::postgres::PgRow) -> Result<Escrow, CoreError> {
    Ok(Escrow {
        id: EscrowId::from_uuid(row.try_get("id").map_err(db_err)?),
        task_id: TaskId::from_uuid(row.try_get("task_id").map_err(db_err)?),
        amount: Cents(row.try_get("amount_cents").map_err(db_err)?),
        state: rowconv::escrow_state::from_str(row.try_get("state").map_err(db_err)?),
        refund_amount: row.try_get::<Option<i64>, _>("refund_amount_cents").map_err(db_err)?.map(Cents),
        release_amount: row.try_get::<Option<i64>, _>("release_amount_cents").map_err(db_err)?.map(Cents),
        payment_intent_id: row.try_get("payment_intent_id").map_err(db_err)?,
        transfer_id: row.try_get("transfer_id").map_err(db_err)?,
        version: row.try_get("version").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

impl Store {
    pub async fn get_escrow(&self, id: EscrowId) -> Result<Option<Escrow>, CoreError> {
        let row = sqlx::query("SELECT * FROM escrows WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_escrow).transpose()
    }

    pub async fn get_escrow_by_task(&self, task_id: TaskId) -> Result<Option<Escrow>, CoreError> {
        let row = sqlx::query("SELECT * FROM escrows WHERE task_id = $1")
            .bind(task_id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_escrow).transpose()
    }
}

pub async fn insert_escrow(txn: &mut Txn, escrow: &Escrow) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO escrows (id, task_id, amount_cents, state, version, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)",
    )
    .bind(escrow.id.as_uuid())
    .bind(escrow.task_id.as_uuid())
    .bind(escrow.amount.0)
    .bind(rowconv::escrow_state::to_str(escrow.state))
    .bind(escrow.version)
    .bind(escrow.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn lock_escrow_for_update(txn: &mut Txn, id: EscrowId) -> Result<Option<Escrow>, CoreError> {
    let row = sqlx::query("SELECT * FROM escrows WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_escrow).transpose()
}

pub async fn lock_escrow_for_update_by_task(txn: &mut Txn, task_id: TaskId) -> Result<Option<Escrow>, CoreError> {
    let row = sqlx::query("SELECT * FROM escrows WHERE task_id = $1 FOR UPDATE")
        .bind(task_id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_escrow).transpose()
}

/// Read-only lock (verification only — resolve never writes escrow
/// directly per §5's fixed lock-order rule).
pub async fn lock_escrow_for_share(txn: &mut Txn, id: EscrowId) -> Result<Option<Escrow>, CoreError> {
    let row = sqlx::query("SELECT * FROM escrows WHERE id = $1 FOR SHARE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_escrow).transpose()
}

pub async fn update_escrow_state(
    txn: &mut Txn,
    escrow: &Escrow,
    expected_version: i64,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "UPDATE escrows SET state = $2, refund_amount_cents = $3, release_amount_cents = $4,
            payment_intent_id = $5, transfer_id = $6, version = version + 1
         WHERE id = $1 AND version = $7",
    )
    .bind(escrow.id.as_uuid())
    .bind(rowconv::escrow_state::to_str(escrow.state))
    .bind(escrow.refund_amount.map(|c| c.0))
    .bind(escrow.release_amount.map(|c| c.0))
    .bind(&escrow.payment_intent_id)
    .bind(&escrow.transfer_id)
    .bind(expected_version)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}

/// Idempotent on `(external_event_id, event_type)` when the former is set,
/// which effect workers rely on for at-least-once outbox redelivery.
/// User-initiated entries (release/refund) carry no `external_event_id` and
/// are never deduplicated, since each call site already guards against
/// double-application via the escrow's own state machine.
pub async fn insert_revenue_ledger_entry(
    txn: &mut Txn,
    entry: &RevenueLedgerEntry,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "INSERT INTO revenue_ledger (id, event_type, currency, gross_cents, platform_fee_cents,
            net_cents, fee_basis_points, processor_fee_cents, escrow_id, external_charge_id,
            external_event_id, metadata, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
         ON CONFLICT (external_event_id, event_type) WHERE external_event_id IS NOT NULL DO NOTHING",
    )
    .bind(entry.id.as_uuid())
    .bind(rowconv::revenue_event_type::to_str(entry.event_type))
    .bind(&entry.currency)
    .bind(entry.gross.0)
    .bind(entry.platform_fee.0)
    .bind(entry.net.0)
    .bind(entry.fee_basis_points.0 as i32)
    .bind(entry.processor_fee.0)
    .bind(entry.escrow_id.map(|e| e.as_uuid()))
    .bind(&entry.external_charge_id)
    .bind(&entry.external_event_id)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}

/// Backfills `processor_fee_cents` on the platform-fee row for a charge once
/// its balance transaction settles (§4.F payout reconciliation). Only
/// touches rows still at zero, so a retried `charge.succeeded` redelivery
/// cannot overwrite a value another delivery already wrote.
pub async fn backfill_processor_fee(
    txn: &mut Txn,
    external_charge_id: &str,
    processor_fee: Cents,
) -> Result<u64, CoreError> {
    let result = sqlx::query(
        "UPDATE revenue_ledger SET processor_fee_cents = $2
         WHERE external_charge_id = $1 AND processor_fee_cents = 0",
    )
    .bind(external_charge_id)
    .bind(processor_fee.0)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected())
}

pub async fn insert_xp_ledger_entry(txn: &mut Txn, entry: &XpLedgerEntry) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "INSERT INTO xp_ledger (id, user_id, task_id, escrow_id, base_xp, streak_multiplier,
            decay_factor, effective_xp, xp_before, xp_after, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
         ON CONFLICT (user_id, escrow_id) DO NOTHING",
    )
    .bind(entry.id.as_uuid())
    .bind(entry.user_id.as_uuid())
    .bind(entry.task_id.as_uuid())
    .bind(entry.escrow_id.as_uuid())
    .bind(entry.base_xp)
    .bind(entry.streak_multiplier)
    .bind(entry.decay_factor)
    .bind(entry.effective_xp)
    .bind(entry.xp_before)
    .bind(entry.xp_after)
    .bind(entry.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}
