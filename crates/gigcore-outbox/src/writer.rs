use chrono::{DateTime, Utc};
use gigcore_core::ids::OutboxId;
use gigcore_core::model::{OutboxQueue, OutboxRow, OutboxStatus};

/// Writer contract helper (§4.B): builds the outbox row a caller inserts in
/// the same transaction as its domain write. The idempotency key is fixed
/// as `{event_type}:{aggregate_id}:{version}` per the contract.
pub fn new_outbox_row(
    event_type: &str,
    aggregate_type: &str,
    aggregate_id: &str,
    event_version: i64,
    queue: OutboxQueue,
    payload: serde_json::Value,
    now: DateTime<Utc>,
) -> OutboxRow {
    OutboxRow {
        id: OutboxId::new(),
        event_type: event_type.to_string(),
        aggregate_type: aggregate_type.to_string(),
        aggregate_id: aggregate_id.to_string(),
        event_version,
        idempotency_key: format!("{event_type}:{aggregate_id}:{event_version}"),
        payload,
        queue,
        status: OutboxStatus::Pending,
        attempts: 0,
        next_attempt_at: now,
        created_at: now,
    }
}
