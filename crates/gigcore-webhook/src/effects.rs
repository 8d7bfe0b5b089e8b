use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigcore_core::error::CoreError;
use gigcore_core::ids::{RevenueLedgerId, StripeEventId};
use gigcore_core::model::{OutboxQueue, OutboxRow, Plan, RevenueEventType, RevenueLedgerEntry};
use gigcore_core::money::{BasisPoints, Cents};
use gigcore_core::ports::PaymentProcessorApi;
use gigcore_outbox::dispatcher::{EffectOutcome, EffectWorker};
use gigcore_store::{stripe_event, users, Store};
use tracing::{info, warn};

/// Reads `stripe.event_received` outbox rows and applies plan transitions,
/// revenue-ledger appends, and payout reconciliation (§4.F). Idempotent on
/// `(external_event_id, effect_kind)`: plan updates are naturally idempotent,
/// and revenue-ledger inserts are guarded by the unique index on
/// `(external_event_id, event_type)`.
pub struct StripeEffectWorker {
    store: Arc<Store>,
    processor: Arc<dyn PaymentProcessorApi>,
}

impl StripeEffectWorker {
    pub fn new(store: Arc<Store>, processor: Arc<dyn PaymentProcessorApi>) -> Self {
        Self { store, processor }
    }
}

#[async_trait]
impl EffectWorker for StripeEffectWorker {
    fn queue(&self) -> OutboxQueue {
        OutboxQueue::CriticalPayments
    }

    fn can_handle(&self, event_type: &str) -> bool {
        event_type == "stripe.event_received"
    }

    async fn handle(&self, row: &OutboxRow) -> Result<EffectOutcome, CoreError> {
        let external_event_id = row
            .payload
            .get("external_event_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::Serialization("outbox row missing external_event_id".to_string()))?;
        let external_event_id = StripeEventId(external_event_id.to_string());

        let stripe_event = self
            .store
            .in_txn({
                let id = external_event_id.clone();
                move |txn| Box::pin(async move { stripe_event::get_stripe_event(txn, &id).await })
            })
            .await?
            .ok_or_else(|| {
                CoreError::Storage(format!("stripe event {} missing after ingest", external_event_id.0))
            })?;

        let event_type = stripe_event.event_type.as_str();
        let object = &stripe_event.raw_payload["data"]["object"];

        let outcome = match event_type {
            "customer.subscription.updated" | "customer.subscription.created" => {
                self.sync_plan(object, &external_event_id, stripe_event.external_created_at).await
            }
            "customer.subscription.deleted" => {
                self.downgrade_plan(object, &external_event_id).await
            }
            "charge.dispute.created" => {
                self.record_chargeback(object, &external_event_id, RevenueEventType::Chargeback).await
            }
            "charge.dispute.closed" => {
                let won = object["status"].as_str() == Some("won");
                if won {
                    self.record_chargeback(object, &external_event_id, RevenueEventType::ChargebackReversal).await
                } else {
                    Ok(())
                }
            }
            "charge.succeeded" => self.reconcile_processor_fee(object, &external_event_id).await,
            _ => {
                info!(event_type, "stripe event type has no registered effect");
                Ok(())
            }
        };

        match outcome {
            Ok(()) => Ok(EffectOutcome::Processed),
            Err(e) if e.is_retryable() => {
                warn!(error = %e, event_type, "stripe effect failed, will retry");
                Ok(EffectOutcome::Retry)
            }
            Err(e) => Err(e),
        }
    }
}

impl StripeEffectWorker {
    async fn sync_plan(
        &self,
        object: &serde_json::Value,
        external_event_id: &StripeEventId,
        external_created_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let customer_id = object["customer"]
            .as_str()
            .ok_or_else(|| CoreError::Serialization("subscription event missing customer".to_string()))?
            .to_string();
        let plan = plan_from_subscription(object);
        let current_period_end = object["current_period_end"]
            .as_i64()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or(external_created_at);

        let event_id = external_event_id.clone();
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let user = users::find_user_by_stripe_customer(txn, &customer_id).await?;
                    let Some(user) = user else {
                        warn!(customer_id, event_id = %event_id.0, "no user for stripe customer");
                        return Ok(());
                    };
                    users::update_user_plan(txn, user.id, plan, Some(current_period_end)).await
                })
            })
            .await
    }

    async fn downgrade_plan(
        &self,
        object: &serde_json::Value,
        external_event_id: &StripeEventId,
    ) -> Result<(), CoreError> {
        let customer_id = object["customer"]
            .as_str()
            .ok_or_else(|| CoreError::Serialization("subscription event missing customer".to_string()))?
            .to_string();
        let event_id = external_event_id.clone();
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let user = users::find_user_by_stripe_customer(txn, &customer_id).await?;
                    let Some(user) = user else {
                        warn!(customer_id, event_id = %event_id.0, "no user for stripe customer");
                        return Ok(());
                    };
                    users::update_user_plan(txn, user.id, Plan::Free, None).await
                })
            })
            .await
    }

    async fn record_chargeback(
        &self,
        object: &serde_json::Value,
        external_event_id: &StripeEventId,
        event_type: RevenueEventType,
    ) -> Result<(), CoreError> {
        let amount = Cents(object["amount"].as_i64().unwrap_or(0));
        let charge_id = object["charge"].as_str().map(str::to_string);
        let sign = if matches!(event_type, RevenueEventType::Chargeback) { -1 } else { 1 };
        let entry = RevenueLedgerEntry {
            id: RevenueLedgerId::new(),
            event_type,
            currency: "usd".to_string(),
            gross: Cents(sign * amount.0),
            platform_fee: Cents::ZERO,
            net: Cents(sign * amount.0),
            fee_basis_points: BasisPoints(0),
            processor_fee: Cents::ZERO,
            escrow_id: None,
            external_charge_id: charge_id,
            external_event_id: Some(external_event_id.0.clone()),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        };
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    gigcore_store::escrow::insert_revenue_ledger_entry(txn, &entry).await?;
                    Ok(())
                })
            })
            .await
    }

    /// Stripe charges a processing fee per charge, reported on the
    /// `balance_transaction` embedded in `charge.succeeded`; it is not known
    /// at escrow-release time, so it is read back here via the payment
    /// processor port and backfilled onto the matching platform-fee row
    /// rather than parsed eagerly out of the webhook body (the embedded
    /// balance transaction is often still `pending`). A `None` fee (not yet
    /// settled) is retried by the outbox like any other transient failure.
    async fn reconcile_processor_fee(
        &self,
        object: &serde_json::Value,
        external_event_id: &StripeEventId,
    ) -> Result<(), CoreError> {
        let charge_id = object["id"].as_str().unwrap_or_default();
        if charge_id.is_empty() {
            warn!(event_id = %external_event_id.0, "charge.succeeded missing charge id");
            return Ok(());
        }

        let Some(fee) = self.processor.get_charge_fee(charge_id).await? else {
            return Err(CoreError::ExternalUnavailable(format!(
                "balance transaction for charge {charge_id} not yet settled"
            )));
        };

        let charge_id = charge_id.to_string();
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let updated = gigcore_store::escrow::backfill_processor_fee(txn, &charge_id, fee).await?;
                    if updated == 0 {
                        warn!(charge_id, "no revenue-ledger row found to backfill processor fee");
                    }
                    Ok(())
                })
            })
            .await
    }
}

fn plan_from_subscription(object: &serde_json::Value) -> Plan {
    let price_nickname = object["items"]["data"][0]["price"]["nickname"]
        .as_str()
        .unwrap_or_default()
        .to_lowercase();
    if price_nickname.contains("pro") {
        Plan::Pro
    } else if price_nickname.contains("premium") {
        Plan::Premium
    } else {
        Plan::Free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parsed_from_price_nickname() {
        let object = serde_json::json!({
            "items": {"data": [{"price": {"nickname": "Premium Monthly"}}]}
        });
        assert_eq!(plan_from_subscription(&object), Plan::Premium);
    }

    #[test]
    fn unknown_price_falls_back_to_free() {
        let object = serde_json::json!({"items": {"data": [{"price": {"nickname": "mystery"}}]}});
        assert_eq!(plan_from_subscription(&object), Plan::Free);
    }
}
