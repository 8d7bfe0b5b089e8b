use std::sync::Arc;

use chrono::{Duration, Utc};
use gigcore_core::constants::{DECAY_COOLDOWN_DAYS, EXPERTISE_LOCK_DAYS, MAX_ACTIVE_EXPERTISE};
use gigcore_core::error::CoreError;
use gigcore_core::ids::{CapacityChangeLogId, ExpertiseId, UserExpertiseId, UserId, WaitlistId};
use gigcore_core::model::{CapacityChangeLogEntry, ExpertiseSlot, UserExpertise, WaitlistEntry};
use gigcore_store::{supply as supply_store, Store};
use tracing::info;

enum AdmissionOutcome {
    Admitted(UserExpertise),
    Waitlisted { reason: String },
}

/// Owns the admission gate, removal, and promotion (§4.G). Every check in
/// `admit` runs inside one transaction holding `FOR UPDATE` locks on the
/// user's active rows and the target capacity row, so concurrent admissions
/// against the same (expertise, zone) serialize on the capacity lock.
pub struct AdmissionGate {
    store: Arc<Store>,
}

impl AdmissionGate {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Returns the admitted row on success. A WAITLISTED gate outcome still
    /// commits the waitlist row and change-log entry, then surfaces as
    /// `CoreError::SupplyWaitlisted` to the caller — the transaction only
    /// rolls back on a genuine precondition failure (LOCKED/MAX/DUPLICATE/
    /// COOLDOWN), never on a successful gate evaluation.
    pub async fn admit(
        &self,
        user_id: UserId,
        expertise_id: ExpertiseId,
        zone: String,
        slot: ExpertiseSlot,
    ) -> Result<UserExpertise, CoreError> {
        let outcome = self
            .store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let active_rows = supply_store::list_active_user_expertise_for_update(txn, user_id).await?;

                    // Step 1: 30-day change lock.
                    if active_rows.iter().any(|r| r.locked_until > now) {
                        return Err(CoreError::SupplyLocked);
                    }
                    // Step 2: max-two check.
                    if active_rows.len() >= MAX_ACTIVE_EXPERTISE {
                        return Err(CoreError::SupplyMax);
                    }
                    // Step 3: duplicate / cooldown / stale-row cleanup.
                    if active_rows.iter().any(|r| r.expertise_id == expertise_id) {
                        return Err(CoreError::SupplyDuplicate);
                    }
                    let cooldown_cutoff = now - Duration::days(DECAY_COOLDOWN_DAYS);
                    if let Some(stale) =
                        supply_store::find_any_inactive_expertise_for_update(txn, user_id, expertise_id).await?
                    {
                        if stale.removed_at.map(|r| r > cooldown_cutoff).unwrap_or(false) {
                            return Err(CoreError::SupplyCooldown);
                        }
                        supply_store::delete_stale_inactive_row(txn, stale.id).await?;
                    }

                    // Step 4: lock capacity, compute effective_max.
                    let mut capacity = supply_store::lock_capacity_for_update(txn, expertise_id, &zone)
                        .await?
                        .ok_or(CoreError::NotFound("capacity"))?;
                    let weight = slot.weight();
                    let effective_max = capacity.effective_max(now);

                    // Gate 1 (hard cap), Gate 2 (throughput ratio).
                    let gate1_ok = capacity.current_weight + weight <= effective_max;
                    let gate2_ok =
                        capacity.active_hustlers == 0 || capacity.liquidity_ratio >= capacity.min_task_to_supply_ratio;

                    if !gate1_ok || !gate2_ok {
                        let reason = if !gate1_ok {
                            "capacity: effective_max would be exceeded".to_string()
                        } else {
                            "throughput: liquidity_ratio below min_task_to_supply_ratio".to_string()
                        };
                        let position = supply_store::next_waitlist_position(txn, expertise_id, &zone).await?;
                        let entry = WaitlistEntry {
                            id: WaitlistId::new(),
                            user_id,
                            expertise_id,
                            zone: zone.clone(),
                            slot,
                            position,
                            reason: reason.clone(),
                            invited_at: None,
                            invite_expires_at: None,
                            cancelled: false,
                            created_at: now,
                        };
                        supply_store::insert_waitlist_entry(txn, &entry).await?;
                        log_outcome(txn, capacity.id, Some(user_id), "admit", "waitlisted", &reason, now).await?;
                        return Ok(AdmissionOutcome::Waitlisted { reason });
                    }

                    // Step 8: admit.
                    let row = UserExpertise {
                        id: UserExpertiseId::new(),
                        user_id,
                        expertise_id,
                        zone: zone.clone(),
                        slot,
                        slot_weight: weight,
                        effective_weight: weight,
                        active: true,
                        locked_until: now + Duration::days(EXPERTISE_LOCK_DAYS),
                        last_task_accepted_at: None,
                        removed_at: None,
                        created_at: now,
                    };
                    supply_store::insert_user_expertise(txn, &row).await?;

                    let expected_version = capacity.version;
                    capacity.current_weight += weight;
                    capacity.active_hustlers += 1;
                    if !supply_store::update_capacity(txn, &capacity, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }

                    log_outcome(txn, capacity.id, Some(user_id), "admit", "admitted", "gates passed", now).await?;
                    info!(user_id = %user_id, expertise_id = %expertise_id, zone = %zone, "expertise admitted");
                    Ok(AdmissionOutcome::Admitted(row))
                })
            })
            .await?;

        match outcome {
            AdmissionOutcome::Admitted(row) => Ok(row),
            AdmissionOutcome::Waitlisted { reason } => Err(CoreError::SupplyWaitlisted { reason }),
        }
    }

    /// Decrements capacity by the row's `effective_weight` (not its nominal
    /// `slot_weight`) and soft-deletes the row.
    pub async fn remove(&self, user_expertise_id: UserExpertiseId) -> Result<(), CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let row = supply_store::lock_user_expertise_for_update(txn, user_expertise_id)
                        .await?
                        .ok_or(CoreError::NotFound("user_expertise"))?;
                    if !row.active {
                        return Err(CoreError::InvalidState("user_expertise row is already inactive"));
                    }

                    let mut capacity = supply_store::lock_capacity_for_update(txn, row.expertise_id, &row.zone)
                        .await?
                        .ok_or(CoreError::NotFound("capacity"))?;
                    let expected_version = capacity.version;
                    capacity.current_weight -= row.effective_weight;
                    capacity.active_hustlers -= 1;
                    if !supply_store::update_capacity(txn, &capacity, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }

                    supply_store::soft_delete_user_expertise(txn, row.id, now).await?;
                    log_outcome(txn, capacity.id, Some(row.user_id), "remove", "removed", "explicit removal", now)
                        .await?;
                    info!(user_expertise_id = %user_expertise_id, "expertise removed");
                    Ok(())
                })
            })
            .await
    }

    /// Promotes a secondary row to primary, swapping slot weights with the
    /// user's current primary row and reapplying a fresh 30-day lock to
    /// both (§4.G). Requires the user to hold exactly one active row of
    /// each slot.
    pub async fn promote(&self, user_id: UserId) -> Result<(), CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let active_rows = supply_store::list_active_user_expertise_for_update(txn, user_id).await?;
                    let mut primary = active_rows
                        .iter()
                        .find(|r| r.slot == ExpertiseSlot::Primary)
                        .cloned()
                        .ok_or(CoreError::InvalidState("user has no active primary row to demote"))?;
                    let mut secondary = active_rows
                        .iter()
                        .find(|r| r.slot == ExpertiseSlot::Secondary)
                        .cloned()
                        .ok_or(CoreError::InvalidState("user has no active secondary row to promote"))?;

                    primary.slot = ExpertiseSlot::Secondary;
                    primary.slot_weight = ExpertiseSlot::Secondary.weight();
                    primary.effective_weight = primary.slot_weight;
                    primary.locked_until = now + Duration::days(EXPERTISE_LOCK_DAYS);

                    secondary.slot = ExpertiseSlot::Primary;
                    secondary.slot_weight = ExpertiseSlot::Primary.weight();
                    secondary.effective_weight = secondary.slot_weight;
                    secondary.locked_until = now + Duration::days(EXPERTISE_LOCK_DAYS);

                    supply_store::update_user_expertise(txn, &primary).await?;
                    supply_store::update_user_expertise(txn, &secondary).await?;

                    info!(user_id = %user_id, "expertise slots promoted");
                    Ok(())
                })
            })
            .await
    }
}

async fn log_outcome(
    txn: &mut gigcore_store::Txn,
    capacity_id: gigcore_core::ids::CapacityId,
    user_id: Option<UserId>,
    action: &str,
    outcome: &str,
    detail: &str,
    now: chrono::DateTime<Utc>,
) -> Result<(), CoreError> {
    let entry = CapacityChangeLogEntry {
        id: CapacityChangeLogId::new(),
        capacity_id,
        user_id,
        action: action.to_string(),
        outcome: outcome.to_string(),
        detail: detail.to_string(),
        created_at: now,
    };
    supply_store::insert_change_log(txn, &entry).await
}
