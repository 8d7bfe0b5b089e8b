use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::DateTime;
use gigcore_core::error::CoreError;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::ApiState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Receives a raw Stripe webhook POST. The body is read as bytes (not
/// `Json<T>`) so the exact wire representation survives for signature
/// verification; the envelope fields `ingest` needs are then picked out of
/// the same bytes with a cheap untyped parse.
#[instrument(skip_all, name = "stripe_webhook")]
pub async fn stripe_webhook(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    let signature_hex = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(CoreError::SignatureVerificationFailed)?;

    let envelope: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| CoreError::Serialization(format!("malformed webhook body: {e}")))?;
    let external_event_id = envelope
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CoreError::Serialization("webhook body missing \"id\"".into()))?;
    let event_type = envelope
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CoreError::Serialization("webhook body missing \"type\"".into()))?;
    let created_unix = envelope
        .get("created")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| CoreError::Serialization("webhook body missing \"created\"".into()))?;
    let external_created_at = DateTime::from_timestamp(created_unix, 0)
        .ok_or_else(|| CoreError::Serialization("webhook \"created\" out of range".into()))?;

    let outcome = gigcore_webhook::ingest(
        &state.store,
        &state.stripe_webhook_secret,
        &body,
        signature_hex,
        external_event_id,
        event_type,
        external_created_at,
    )
    .await?;

    // Stripe retries on anything but 2xx; a duplicate replay is still a
    // success from its point of view (invariant S1 absorbs it silently).
    let _ = outcome.stored;
    Ok(StatusCode::OK)
}
