use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gigcore_core::constants::{outbox_backoff_ms, OUTBOX_MAX_ATTEMPTS};
use gigcore_core::error::CoreError;
use gigcore_core::model::{OutboxQueue, OutboxRow};
use gigcore_store::Store;
use tracing::{info, warn};

/// Outcome of handing one outbox row to its effect worker.
pub enum EffectOutcome {
    Processed,
    Retry,
}

/// Implemented once per queue (payments, trust, notifications, exports,
/// maintenance) by the crate that owns that side effect. All effect
/// workers are idempotent on `(provider_event_id, effect_kind)` or
/// equivalent, so at-least-once redelivery from the dispatcher is safe.
#[async_trait]
pub trait EffectWorker: Send + Sync {
    fn queue(&self) -> OutboxQueue;

    /// A queue can carry more than one `event_type`; a worker that only
    /// handles some of them overrides this so `CompositeEffectWorker` can
    /// route correctly. Defaults to handling everything on its queue.
    fn can_handle(&self, _event_type: &str) -> bool {
        true
    }

    async fn handle(&self, row: &OutboxRow) -> Result<EffectOutcome, CoreError>;
}

/// Fans a single queue out to several single-purpose workers by
/// `event_type`, since the dispatcher claims one queue at a time but a
/// queue (e.g. `critical_payments`) carries event types owned by different
/// crates (escrow transitions, Stripe ingest effects, dispute payout
/// requests).
pub struct CompositeEffectWorker {
    queue: OutboxQueue,
    workers: Vec<Arc<dyn EffectWorker>>,
}

impl CompositeEffectWorker {
    pub fn new(queue: OutboxQueue, workers: Vec<Arc<dyn EffectWorker>>) -> Self {
        Self { queue, workers }
    }
}

#[async_trait]
impl EffectWorker for CompositeEffectWorker {
    fn queue(&self) -> OutboxQueue {
        self.queue
    }

    async fn handle(&self, row: &OutboxRow) -> Result<EffectOutcome, CoreError> {
        for worker in &self.workers {
            if worker.can_handle(&row.event_type) {
                return worker.handle(row).await;
            }
        }
        warn!(event_type = %row.event_type, queue = ?self.queue, "no effect worker registered for event type");
        Ok(EffectOutcome::Processed)
    }
}

/// Drives one queue's claim-dispatch-ack loop. Mirrors the long-lived
/// worker-loop shape used for the node's background tasks: an owned
/// `tokio::time::interval` ticking a claim-and-drain cycle.
pub struct OutboxDispatcher {
    store: Arc<Store>,
    worker: Arc<dyn EffectWorker>,
    batch_size: i64,
    poll_interval: Duration,
}

impl OutboxDispatcher {
    pub fn new(store: Arc<Store>, worker: Arc<dyn EffectWorker>, batch_size: i64, poll_interval: Duration) -> Self {
        Self { store, worker, batch_size, poll_interval }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.drain_once().await {
                warn!(error = %e, queue = ?self.worker.queue(), "outbox drain cycle failed");
            }
        }
    }

    async fn drain_once(&self) -> Result<(), CoreError> {
        let claimed = self
            .store
            .claim_pending_outbox_rows(self.worker.queue(), self.batch_size)
            .await?;

        for row in claimed {
            let outcome = self.worker.handle(&row).await;
            let is_poison = matches!(&outcome, Err(e) if !e.is_retryable());
            match outcome {
                Ok(EffectOutcome::Processed) => {
                    self.store.mark_outbox_processed(row.id).await?;
                    info!(idempotency_key = %row.idempotency_key, "outbox row processed");
                }
                Ok(EffectOutcome::Retry) | Err(_) => {
                    let attempts = row.attempts + 1;
                    let backoff_ms = outbox_backoff_ms(attempts);
                    let next_attempt_at = row.next_attempt_at + chrono::Duration::milliseconds(backoff_ms);
                    self.store
                        .mark_outbox_retry_or_failed(row.id, attempts, OUTBOX_MAX_ATTEMPTS, next_attempt_at)
                        .await?;
                    if is_poison {
                        warn!(idempotency_key = %row.idempotency_key, attempts, "poison error, attempts incremented without backoff reset");
                    } else {
                        warn!(idempotency_key = %row.idempotency_key, attempts, "outbox row retry scheduled");
                    }
                }
            }
        }
        Ok(())
    }
}
