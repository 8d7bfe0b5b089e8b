use gigcore_core::error::CoreError;
use gigcore_core::ids::StripeEventId;
use gigcore_core::model::StripeEventRow;
use sqlx::Row;

use crate::pool::Txn;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn row_to_stripe_event(row: &sqlx::postgres::PgRow) -> Result<StripeEventRow, CoreError> {
    Ok(StripeEventRow {
        external_event_id: StripeEventId(row.try_get("external_event_id").map_err(db_err)?),
        event_type: row.try_get("event_type").map_err(db_err)?,
        external_created_at: row.try_get("external_created_at").map_err(db_err)?,
        raw_payload: row.try_get("raw_payload").map_err(db_err)?,
        received_at: row.try_get("received_at").map_err(db_err)?,
    })
}

/// Ingest step 2 (§4.F, invariant S1): primary-key uniqueness on the
/// provider's event id is the at-most-once mechanism. Zero rows affected
/// means this is a duplicate replay — the caller returns success with
/// `stored = false` rather than an error.
pub async fn insert_stripe_event(txn: &mut Txn, row: &StripeEventRow) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "INSERT INTO stripe_events (external_event_id, event_type, external_created_at, raw_payload, received_at)
         VALUES ($1,$2,$3,$4,$5) ON CONFLICT (external_event_id) DO NOTHING",
    )
    .bind(&row.external_event_id.0)
    .bind(&row.event_type)
    .bind(row.external_created_at)
    .bind(&row.raw_payload)
    .bind(row.received_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}

pub async fn stripe_event_exists(txn: &mut Txn, id: &StripeEventId) -> Result<bool, CoreError> {
    let row = sqlx::query("SELECT 1 FROM stripe_events WHERE external_event_id = $1")
        .bind(&id.0)
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(row.is_some())
}

/// Effect workers re-read the full raw payload by id rather than carrying it
/// through the outbox row, which only stores a thin pointer.
pub async fn get_stripe_event(
    txn: &mut Txn,
    id: &StripeEventId,
) -> Result<Option<StripeEventRow>, CoreError> {
    let row = sqlx::query("SELECT * FROM stripe_events WHERE external_event_id = $1")
        .bind(&id.0)
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_stripe_event).transpose()
}
