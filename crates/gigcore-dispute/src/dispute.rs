use std::sync::Arc;

use chrono::{Duration, Utc};
use gigcore_core::constants::DISPUTE_WINDOW_HOURS;
use gigcore_core::error::CoreError;
use gigcore_core::ids::{DisputeId, TaskId, TrustLedgerId, UserId};
use gigcore_core::model::{
    Dispute, DisputeOutcome, DisputeRole, DisputeState, EscrowState, OutboxQueue, TaskLifecycleState, TrustLedgerEntry,
};
use gigcore_core::money::Cents;
use gigcore_outbox::new_outbox_row;
use gigcore_store::{escrow as escrow_store, outbox as outbox_store, tasks as task_store, users as user_store, Store};
use tracing::info;

pub enum DisputeResolution {
    Release,
    Refund,
    Split { refund_amount: Cents, release_amount: Cents },
}

/// Owns dispute creation and admin resolution (§4.E). `resolve` never
/// writes the escrow directly — it requests the transition via the outbox
/// so a separate worker performs the actual transfer, keeping "resolver"
/// and "actor" distinct roles even when both run in the same process.
pub struct DisputeService {
    store: Arc<Store>,
}

impl DisputeService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Preconditions: `task.completed_at` within `DISPUTE_WINDOW_HOURS`;
    /// `initiator_id` is the task's poster or worker; escrow is FUNDED.
    /// Atomically locks the escrow (FUNDED→LOCKED_DISPUTE) and creates the
    /// dispute row.
    pub async fn create(&self, task_id: TaskId, initiator_id: UserId) -> Result<Dispute, CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut task = task_store::lock_task_for_update(txn, task_id)
                        .await?
                        .ok_or(CoreError::NotFound("task"))?;
                    let completed_at = task
                        .completed_at
                        .ok_or(CoreError::InvalidState("task has no completed_at to dispute against"))?;
                    let now = Utc::now();
                    if now - completed_at > Duration::hours(DISPUTE_WINDOW_HOURS) {
                        return Err(CoreError::InvalidState("dispute window has elapsed"));
                    }

                    let poster_id = task.poster_id;
                    let worker_id = task
                        .worker_id
                        .ok_or(CoreError::InvalidState("task has no assigned worker"))?;
                    if initiator_id != poster_id && initiator_id != worker_id {
                        return Err(CoreError::Forbidden);
                    }

                    let mut escrow = escrow_store::lock_escrow_for_update_by_task(txn, task_id)
                        .await?
                        .ok_or(CoreError::NotFound("escrow"))?;
                    if escrow.state != EscrowState::Funded {
                        return Err(CoreError::InvalidState("escrow must be FUNDED to open a dispute"));
                    }
                    let expected_version = escrow.version;
                    escrow.state = EscrowState::LockedDispute;
                    if !escrow_store::update_escrow_state(txn, &escrow, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    escrow.version += 1;

                    if !task.lifecycle_state.can_transition_to(TaskLifecycleState::Disputed) {
                        return Err(CoreError::InvalidTransition("task not eligible for DISPUTED"));
                    }
                    let expected_task_version = task.version;
                    task.lifecycle_state = TaskLifecycleState::Disputed;
                    if !task_store::update_task_state(txn, &task, expected_task_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    task.version += 1;

                    let dispute = Dispute {
                        id: DisputeId::new(),
                        task_id,
                        escrow_id: escrow.id,
                        initiator_id,
                        poster_id,
                        worker_id,
                        state: DisputeState::Open,
                        outcome: None,
                        refund_amount: None,
                        release_amount: None,
                        version: 1,
                        created_at: now,
                    };
                    gigcore_store::dispute::insert_dispute(txn, &dispute).await?;

                    let row = new_outbox_row(
                        "dispute.created",
                        "dispute",
                        &dispute.id.to_string(),
                        1,
                        OutboxQueue::CriticalTrust,
                        serde_json::json!({
                            "dispute_id": dispute.id,
                            "task_id": task_id,
                            "escrow_id": escrow.id,
                        }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    info!(dispute_id = %dispute.id, task_id = %task_id, "dispute created");
                    Ok(dispute)
                })
            })
            .await
    }

    /// Preconditions: admin authority; escrow LOCKED_DISPUTE; for `Split`,
    /// `refund_amount + release_amount == escrow.amount`. Writes one outbox
    /// event requesting the escrow transition plus two trust-ledger rows
    /// keyed `trust.dispute_resolved.{role}:{dispute_id}:1`, one per party.
    pub async fn resolve(
        &self,
        dispute_id: DisputeId,
        admin_id: UserId,
        resolution: DisputeResolution,
    ) -> Result<Dispute, CoreError> {
        if !self.store.is_admin(admin_id).await? {
            return Err(CoreError::Unauthorized);
        }

        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut dispute = gigcore_store::dispute::lock_dispute_for_update(txn, dispute_id)
                        .await?
                        .ok_or(CoreError::NotFound("dispute"))?;
                    if dispute.state.is_terminal() {
                        return Err(CoreError::DisputeTerminal);
                    }
                    if !dispute.state.can_transition_to(DisputeState::Resolved) {
                        return Err(CoreError::InvalidTransition("dispute edge not permitted"));
                    }

                    let escrow = escrow_store::lock_escrow_for_share(txn, dispute.escrow_id)
                        .await?
                        .ok_or(CoreError::NotFound("escrow"))?;
                    if escrow.state != EscrowState::LockedDispute {
                        return Err(CoreError::InvalidState("escrow must be LOCKED_DISPUTE to resolve"));
                    }

                    let (outcome, refund_amount, release_amount, event_type) = match resolution {
                        DisputeResolution::Release => {
                            (DisputeOutcome::Release, None, Some(escrow.amount), "escrow.release_requested")
                        }
                        DisputeResolution::Refund => {
                            (DisputeOutcome::Refund, Some(escrow.amount), None, "escrow.refund_requested")
                        }
                        DisputeResolution::Split { refund_amount, release_amount } => {
                            let sum = refund_amount
                                .checked_add(release_amount)
                                .ok_or_else(|| CoreError::Other("refund/release sum overflow".to_string()))?;
                            if sum != escrow.amount {
                                return Err(CoreError::InvalidState(
                                    "refund_amount + release_amount must equal escrow.amount",
                                ));
                            }
                            (
                                DisputeOutcome::Split,
                                Some(refund_amount),
                                Some(release_amount),
                                "escrow.partial_refund_requested",
                            )
                        }
                    };

                    let expected_version = dispute.version;
                    dispute.state = DisputeState::Resolved;
                    dispute.outcome = Some(outcome);
                    dispute.refund_amount = refund_amount;
                    dispute.release_amount = release_amount;
                    if !gigcore_store::dispute::update_dispute(txn, &dispute, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    dispute.version += 1;

                    let now = Utc::now();
                    let row = new_outbox_row(
                        event_type,
                        "escrow",
                        &dispute.escrow_id.to_string(),
                        dispute.version,
                        OutboxQueue::CriticalPayments,
                        serde_json::json!({
                            "dispute_id": dispute.id,
                            "escrow_id": dispute.escrow_id,
                            "refund_cents": refund_amount.map(|c| c.0),
                            "release_cents": release_amount.map(|c| c.0),
                        }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    for (role, user_id) in [(DisputeRole::Poster, dispute.poster_id), (DisputeRole::Worker, dispute.worker_id)] {
                        let role_key = match role {
                            DisputeRole::Poster => "poster",
                            DisputeRole::Worker => "worker",
                        };
                        let user = user_store::lock_user_for_update(txn, user_id)
                            .await?
                            .ok_or(CoreError::NotFound("user"))?;
                        let entry = TrustLedgerEntry {
                            id: TrustLedgerId::new(),
                            user_id,
                            old_tier: user.trust_tier,
                            new_tier: user.trust_tier,
                            reason_code: format!("dispute_resolved.{role_key}"),
                            source_event_id: dispute.id.to_string(),
                            idempotency_key: format!("trust.dispute_resolved.{role_key}:{}:1", dispute.id),
                            created_at: now,
                        };
                        user_store::insert_trust_ledger_entry(txn, &entry).await?;
                    }

                    info!(dispute_id = %dispute.id, "dispute resolved");
                    Ok(dispute)
                })
            })
            .await
    }
}
