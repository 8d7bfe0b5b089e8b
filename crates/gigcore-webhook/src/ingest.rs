use chrono::{DateTime, Utc};
use gigcore_core::error::CoreError;
use gigcore_core::ids::StripeEventId;
use gigcore_core::model::{OutboxQueue, StripeEventRow};
use gigcore_outbox::new_outbox_row;
use gigcore_store::{outbox as outbox_store, stripe_event, Store};

use crate::signature;

pub struct IngestOutcome {
    /// `false` when the event id had already been seen — a duplicate
    /// replay, not an error (invariant S1: at-most-once ingest).
    pub stored: bool,
}

/// The four-step ingest (§4.F): verify signature, insert the external
/// event row idempotently, append the `stripe.event_received` outbox row,
/// commit. No business logic runs here — only effect workers act on the
/// resulting outbox row.
pub async fn ingest(
    store: &Store,
    secret: &str,
    raw_payload: &[u8],
    signature_hex: &str,
    external_event_id: &str,
    event_type: &str,
    external_created_at: DateTime<Utc>,
) -> Result<IngestOutcome, CoreError> {
    signature::verify(secret, raw_payload, signature_hex)?;

    let external_event_id = StripeEventId(external_event_id.to_string());
    let event_type = event_type.to_string();
    let raw_payload: serde_json::Value =
        serde_json::from_slice(raw_payload).map_err(|e| CoreError::Serialization(e.to_string()))?;

    store
        .in_txn(move |txn| {
            Box::pin(async move {
                let now = Utc::now();
                let row = StripeEventRow {
                    external_event_id: external_event_id.clone(),
                    event_type: event_type.clone(),
                    external_created_at,
                    raw_payload,
                    received_at: now,
                };
                let stored = stripe_event::insert_stripe_event(txn, &row).await?;
                if !stored {
                    return Ok(IngestOutcome { stored: false });
                }

                let outbox_row = new_outbox_row(
                    "stripe.event_received",
                    "stripe_event",
                    &external_event_id.0,
                    1,
                    OutboxQueue::CriticalPayments,
                    serde_json::json!({
                        "external_event_id": external_event_id.0,
                        "event_type": event_type,
                    }),
                    now,
                );
                // Idempotency key is fixed by the contract as
                // `stripe.event_received:{provider_event_id}`, overriding the
                // generic `{type}:{aggregate}:{version}` default.
                let mut outbox_row = outbox_row;
                outbox_row.idempotency_key = format!("stripe.event_received:{}", external_event_id.0);
                outbox_store::append_outbox_row(txn, &outbox_row).await?;

                Ok(IngestOutcome { stored: true })
            })
        })
        .await
}
