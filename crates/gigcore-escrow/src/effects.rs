use std::sync::Arc;

use async_trait::async_trait;
use gigcore_core::error::CoreError;
use gigcore_core::ids::EscrowId;
use gigcore_core::model::{OutboxQueue, OutboxRow};
use gigcore_core::money::Cents;
use gigcore_outbox::dispatcher::{EffectOutcome, EffectWorker};

use crate::EscrowService;

/// Carries out the escrow transitions `DisputeService::resolve` requests.
/// Each of the three event types maps to exactly one `EscrowService` call;
/// the dispute resolver never touches escrow state itself.
pub struct EscrowRequestEffectWorker {
    escrow: Arc<EscrowService>,
}

impl EscrowRequestEffectWorker {
    pub fn new(escrow: Arc<EscrowService>) -> Self {
        Self { escrow }
    }

    fn escrow_id(row: &OutboxRow) -> Result<EscrowId, CoreError> {
        row.payload["escrow_id"]
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map(EscrowId::from_uuid)
            .ok_or_else(|| CoreError::Serialization("outbox row missing escrow_id".to_string()))
    }
}

#[async_trait]
impl EffectWorker for EscrowRequestEffectWorker {
    fn queue(&self) -> OutboxQueue {
        OutboxQueue::CriticalPayments
    }

    fn can_handle(&self, event_type: &str) -> bool {
        matches!(
            event_type,
            "escrow.release_requested" | "escrow.refund_requested" | "escrow.partial_refund_requested"
        )
    }

    async fn handle(&self, row: &OutboxRow) -> Result<EffectOutcome, CoreError> {
        let escrow_id = Self::escrow_id(row)?;
        match row.event_type.as_str() {
            "escrow.release_requested" => {
                self.escrow.release(escrow_id).await?;
            }
            "escrow.refund_requested" => {
                self.escrow.refund(escrow_id, "dispute_resolved".to_string()).await?;
            }
            "escrow.partial_refund_requested" => {
                let refund_amount = Cents(row.payload["refund_cents"].as_i64().unwrap_or(0));
                let release_amount = Cents(row.payload["release_cents"].as_i64().unwrap_or(0));
                self.escrow.partial_refund(escrow_id, refund_amount, release_amount).await?;
            }
            other => {
                return Err(CoreError::Other(format!("unexpected event type {other} routed to escrow worker")))
            }
        }
        Ok(EffectOutcome::Processed)
    }
}
