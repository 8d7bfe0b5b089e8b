use std::sync::Arc;

use chrono::Utc;
use gigcore_core::constants::fee_basis_points_for_category;
use gigcore_core::error::CoreError;
use gigcore_core::ids::{EscrowId, RevenueLedgerId};
use gigcore_core::model::{Escrow, EscrowState, OutboxQueue, RevenueEventType, RevenueLedgerEntry, TaskLifecycleState};
use gigcore_core::money::{BasisPoints, Cents};
use gigcore_outbox::new_outbox_row;
use gigcore_store::{escrow as escrow_store, outbox as outbox_store, tasks as task_store, Store};
use tracing::info;

/// Owns the money-ledger half of escrow (§4.C). Every public method runs in
/// a single transaction: lock, validate, write domain rows, append the
/// outbox row, commit. There is no path that writes an outbox row without
/// also committing the domain change, or vice versa.
pub struct EscrowService {
    store: Arc<Store>,
}

impl EscrowService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn fund(&self, escrow_id: EscrowId, payment_intent_id: String) -> Result<Escrow, CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut escrow = escrow_store::lock_escrow_for_update(txn, escrow_id)
                        .await?
                        .ok_or(CoreError::NotFound("escrow"))?;
                    if escrow.state != EscrowState::Pending {
                        return Err(CoreError::InvalidState("escrow must be PENDING to fund"));
                    }
                    let expected_version = escrow.version;
                    escrow.state = EscrowState::Funded;
                    escrow.payment_intent_id = Some(payment_intent_id);
                    if !escrow_store::update_escrow_state(txn, &escrow, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    escrow.version += 1;

                    let now = Utc::now();
                    let row = new_outbox_row(
                        "escrow.funded",
                        "escrow",
                        &escrow.id.to_string(),
                        escrow.version,
                        OutboxQueue::CriticalPayments,
                        serde_json::json!({ "escrow_id": escrow.id, "task_id": escrow.task_id }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    info!(escrow_id = %escrow.id, "escrow funded");
                    Ok(escrow)
                })
            })
            .await
    }

    /// Precondition: FUNDED with the owning task COMPLETED (I2), or
    /// LOCKED_DISPUTE with the task DISPUTED — the latter is how a
    /// `DisputeResolution::Release` is actually carried out, driving the
    /// task's DISPUTED→COMPLETED edge itself since this is the only writer
    /// of that edge. Writes an additive revenue-ledger row decomposing
    /// gross/fee/net and emits `escrow.released`.
    pub async fn release(&self, escrow_id: EscrowId) -> Result<Escrow, CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut escrow = escrow_store::lock_escrow_for_update(txn, escrow_id)
                        .await?
                        .ok_or(CoreError::NotFound("escrow"))?;
                    if escrow.state.is_terminal() {
                        return Err(CoreError::EscrowTerminal);
                    }
                    if !matches!(escrow.state, EscrowState::Funded | EscrowState::LockedDispute) {
                        return Err(CoreError::InvalidState("escrow must be FUNDED or LOCKED_DISPUTE to release"));
                    }
                    let from_dispute = escrow.state == EscrowState::LockedDispute;

                    let mut task = task_store::lock_task_for_update(txn, escrow.task_id)
                        .await?
                        .ok_or(CoreError::NotFound("task"))?;
                    if from_dispute {
                        if !task.lifecycle_state.can_transition_to(TaskLifecycleState::Completed) {
                            return Err(CoreError::InvalidTransition("task not eligible for COMPLETED from DISPUTED"));
                        }
                    } else if task.lifecycle_state != TaskLifecycleState::Completed {
                        return Err(CoreError::ReleaseRequiresTaskCompleted);
                    }

                    let now = Utc::now();
                    let expected_version = escrow.version;
                    escrow.state = EscrowState::Released;
                    escrow.release_amount = Some(escrow.amount);
                    if !escrow_store::update_escrow_state(txn, &escrow, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    escrow.version += 1;

                    if from_dispute {
                        let expected_task_version = task.version;
                        task.lifecycle_state = TaskLifecycleState::Completed;
                        task.completed_at.get_or_insert(now);
                        if !task_store::update_task_state(txn, &task, expected_task_version).await? {
                            return Err(CoreError::VersionConflict);
                        }
                        task.version += 1;
                    }

                    let fee_bps = BasisPoints(fee_basis_points_for_category(&task.category));
                    let platform_fee = fee_bps.apply(escrow.amount);
                    let net = escrow.amount - platform_fee;
                    let ledger_entry = RevenueLedgerEntry {
                        id: RevenueLedgerId::new(),
                        event_type: RevenueEventType::PlatformFee,
                        currency: "usd".to_string(),
                        gross: escrow.amount,
                        platform_fee,
                        net,
                        fee_basis_points: fee_bps,
                        // The processor's own per-charge fee is reconciled later
                        // from the Stripe balance-transaction webhook, not known
                        // synchronously at release time.
                        processor_fee: Cents::ZERO,
                        escrow_id: Some(escrow.id),
                        external_charge_id: escrow.payment_intent_id.clone(),
                        external_event_id: None,
                        metadata: serde_json::json!({}),
                        created_at: now,
                    };
                    escrow_store::insert_revenue_ledger_entry(txn, &ledger_entry).await?;

                    let row = new_outbox_row(
                        "escrow.released",
                        "escrow",
                        &escrow.id.to_string(),
                        escrow.version,
                        OutboxQueue::CriticalPayments,
                        serde_json::json!({
                            "escrow_id": escrow.id,
                            "task_id": escrow.task_id,
                            "net_cents": net.0,
                        }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    info!(escrow_id = %escrow.id, net_cents = net.0, "escrow released");
                    Ok(escrow)
                })
            })
            .await
    }

    /// Precondition: FUNDED or LOCKED_DISPUTE. The LOCKED_DISPUTE leg also
    /// drives the task's DISPUTED→CANCELLED edge, since this is the only
    /// writer of that edge for a `DisputeResolution::Refund`.
    pub async fn refund(&self, escrow_id: EscrowId, reason: String) -> Result<Escrow, CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut escrow = escrow_store::lock_escrow_for_update(txn, escrow_id)
                        .await?
                        .ok_or(CoreError::NotFound("escrow"))?;
                    if escrow.state.is_terminal() {
                        return Err(CoreError::EscrowTerminal);
                    }
                    if !matches!(escrow.state, EscrowState::Funded | EscrowState::LockedDispute) {
                        return Err(CoreError::InvalidState("escrow must be FUNDED or LOCKED_DISPUTE to refund"));
                    }
                    let from_dispute = escrow.state == EscrowState::LockedDispute;

                    let mut task = if from_dispute {
                        Some(
                            task_store::lock_task_for_update(txn, escrow.task_id)
                                .await?
                                .ok_or(CoreError::NotFound("task"))?,
                        )
                    } else {
                        None
                    };
                    if let Some(task) = &task {
                        if !task.lifecycle_state.can_transition_to(TaskLifecycleState::Cancelled) {
                            return Err(CoreError::InvalidTransition("task not eligible for CANCELLED from DISPUTED"));
                        }
                    }

                    let expected_version = escrow.version;
                    escrow.state = EscrowState::Refunded;
                    escrow.refund_amount = Some(escrow.amount);
                    if !escrow_store::update_escrow_state(txn, &escrow, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    escrow.version += 1;

                    if let Some(task) = &mut task {
                        let expected_task_version = task.version;
                        task.lifecycle_state = TaskLifecycleState::Cancelled;
                        if !task_store::update_task_state(txn, task, expected_task_version).await? {
                            return Err(CoreError::VersionConflict);
                        }
                        task.version += 1;
                    }

                    let now = Utc::now();
                    let row = new_outbox_row(
                        "escrow.refunded",
                        "escrow",
                        &escrow.id.to_string(),
                        escrow.version,
                        OutboxQueue::CriticalPayments,
                        serde_json::json!({ "escrow_id": escrow.id, "task_id": escrow.task_id, "reason": reason }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    info!(escrow_id = %escrow.id, %reason, "escrow refunded");
                    Ok(escrow)
                })
            })
            .await
    }

    /// Precondition: LOCKED_DISPUTE; `refund_amount + release_amount` must
    /// equal the escrow's immutable `amount`. The release leg still earns a
    /// platform fee at the task's category rate; the processor fee is not
    /// prorated across the two legs (undetermined upstream — recorded as
    /// zero on both, matching `release`'s own deferred-reconciliation stance).
    pub async fn partial_refund(
        &self,
        escrow_id: EscrowId,
        refund_amount: Cents,
        release_amount: Cents,
    ) -> Result<Escrow, CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut escrow = escrow_store::lock_escrow_for_update(txn, escrow_id)
                        .await?
                        .ok_or(CoreError::NotFound("escrow"))?;
                    if escrow.state.is_terminal() {
                        return Err(CoreError::EscrowTerminal);
                    }
                    if escrow.state != EscrowState::LockedDispute {
                        return Err(CoreError::InvalidState("escrow must be LOCKED_DISPUTE for a partial refund"));
                    }
                    let sum = refund_amount
                        .checked_add(release_amount)
                        .ok_or_else(|| CoreError::Other("refund/release sum overflow".to_string()))?;
                    if sum != escrow.amount {
                        return Err(CoreError::InvalidState("refund_amount + release_amount must equal escrow.amount"));
                    }

                    let mut task = task_store::lock_task_for_update(txn, escrow.task_id)
                        .await?
                        .ok_or(CoreError::NotFound("task"))?;
                    if !task.lifecycle_state.can_transition_to(TaskLifecycleState::Completed) {
                        return Err(CoreError::InvalidTransition("task not eligible for COMPLETED from DISPUTED"));
                    }

                    let now = Utc::now();
                    let expected_version = escrow.version;
                    escrow.state = EscrowState::RefundPartial;
                    escrow.refund_amount = Some(refund_amount);
                    escrow.release_amount = Some(release_amount);
                    if !escrow_store::update_escrow_state(txn, &escrow, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    escrow.version += 1;

                    // A split still recognizes partial work as delivered, so it
                    // drives the same DISPUTED→COMPLETED edge as a full release;
                    // only a full refund cancels the task outright.
                    let expected_task_version = task.version;
                    task.lifecycle_state = TaskLifecycleState::Completed;
                    task.completed_at.get_or_insert(now);
                    if !task_store::update_task_state(txn, &task, expected_task_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    task.version += 1;

                    if release_amount.is_positive() {
                        let fee_bps = BasisPoints(fee_basis_points_for_category(&task.category));
                        let platform_fee = fee_bps.apply(release_amount);
                        let net = release_amount - platform_fee;
                        let ledger_entry = RevenueLedgerEntry {
                            id: RevenueLedgerId::new(),
                            event_type: RevenueEventType::PlatformFee,
                            currency: "usd".to_string(),
                            gross: release_amount,
                            platform_fee,
                            net,
                            fee_basis_points: fee_bps,
                            processor_fee: Cents::ZERO,
                            escrow_id: Some(escrow.id),
                            external_charge_id: escrow.payment_intent_id.clone(),
                            external_event_id: None,
                            metadata: serde_json::json!({ "partial_refund": true }),
                            created_at: now,
                        };
                        escrow_store::insert_revenue_ledger_entry(txn, &ledger_entry).await?;
                    }

                    let row = new_outbox_row(
                        "escrow.refund_partial",
                        "escrow",
                        &escrow.id.to_string(),
                        escrow.version,
                        OutboxQueue::CriticalPayments,
                        serde_json::json!({
                            "escrow_id": escrow.id,
                            "task_id": escrow.task_id,
                            "refund_cents": refund_amount.0,
                            "release_cents": release_amount.0,
                        }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    info!(escrow_id = %escrow.id, "escrow partially refunded");
                    Ok(escrow)
                })
            })
            .await
    }

    pub async fn lock_for_dispute(&self, escrow_id: EscrowId) -> Result<Escrow, CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut escrow = escrow_store::lock_escrow_for_update(txn, escrow_id)
                        .await?
                        .ok_or(CoreError::NotFound("escrow"))?;
                    if escrow.state != EscrowState::Funded {
                        return Err(CoreError::InvalidState("escrow must be FUNDED to lock for dispute"));
                    }
                    let expected_version = escrow.version;
                    escrow.state = EscrowState::LockedDispute;
                    if !escrow_store::update_escrow_state(txn, &escrow, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    escrow.version += 1;

                    let now = Utc::now();
                    let row = new_outbox_row(
                        "escrow.locked_for_dispute",
                        "escrow",
                        &escrow.id.to_string(),
                        escrow.version,
                        OutboxQueue::CriticalPayments,
                        serde_json::json!({ "escrow_id": escrow.id, "task_id": escrow.task_id }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    info!(escrow_id = %escrow.id, "escrow locked for dispute");
                    Ok(escrow)
                })
            })
            .await
    }
}
