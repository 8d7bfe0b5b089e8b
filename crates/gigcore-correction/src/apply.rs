use std::sync::Arc;

use chrono::{Duration, Utc};
use gigcore_core::constants::CORRECTION_MAX_TTL_HOURS;
use gigcore_core::error::CoreError;
use gigcore_core::ids::CorrectionId;
use gigcore_core::model::{CorrectionRow, CorrectionScope};
use gigcore_store::{correction as correction_store, Store};
use tracing::info;

use crate::budget;

/// §4.H hard wall: the correction engine must never touch escrow, payouts,
/// disputes, trust, revenue, or any kill-switch, no matter what a caller
/// asks it to do.
const FORBIDDEN_TARGET_ENTITIES: &[&str] =
    &["escrow", "payout", "payouts", "dispute", "trust", "revenue", "kill-switch", "kill_switch"];

fn is_forbidden_target(target_entity: &str) -> bool {
    let normalized = target_entity.trim().to_ascii_lowercase();
    FORBIDDEN_TARGET_ENTITIES.contains(&normalized.as_str())
}

/// A non-financial autonomous adjustment to apply. `prior_payload` is
/// supplied by the caller — the engine has no knowledge of the target
/// entity's internals beyond the opaque JSON it is asked to record, only
/// that the change must stay clear of the hard wall (§4.H: never escrow,
/// payouts, disputes, trust, revenue, or any kill-switch).
pub struct ApplyRequest {
    pub correction_type: String,
    pub target_entity: String,
    pub target_id: String,
    pub adjustment_payload: serde_json::Value,
    pub prior_payload: serde_json::Value,
    pub reason_code: String,
    pub scope: CorrectionScope,
    pub zone: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub ttl_hours: i64,
}

pub struct CorrectionService {
    store: Arc<Store>,
}

impl CorrectionService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Returns the applied row, or `Err(CoreError::SafeMode)` /
    /// `Err(CoreError::BudgetExhausted)` — both no-op successes (§7), never
    /// surfaced to callers as invariant violations.
    pub async fn apply(&self, req: ApplyRequest) -> Result<CorrectionRow, CoreError> {
        if self.store.safe_mode_enabled().await? {
            return Err(CoreError::SafeMode);
        }
        if is_forbidden_target(&req.target_entity) {
            return Err(CoreError::CorrectionScopeViolation);
        }

        let ttl_hours = req.ttl_hours.clamp(1, CORRECTION_MAX_TTL_HOURS);
        let now = self.store.now().await?;
        let window = budget::window_start(now);
        let dims = budget::dimensions_for(req.city.as_deref(), req.zone.as_deref(), req.category.as_deref());
        budget::check(&self.store, &dims, window).await?;

        let row = CorrectionRow {
            id: CorrectionId::new(),
            correction_type: req.correction_type,
            target_entity: req.target_entity,
            target_id: req.target_id,
            adjustment_payload: req.adjustment_payload,
            prior_payload: req.prior_payload,
            reason_code: req.reason_code,
            scope: req.scope,
            zone: req.zone,
            city: req.city,
            category: req.category,
            expires_at: now + Duration::hours(ttl_hours),
            reversed: false,
            reversed_at: None,
            verdict: None,
            applied_at: now,
        };

        let applied = self
            .store
            .in_txn(move |txn| {
                Box::pin(async move {
                    correction_store::insert_correction(txn, &row).await?;
                    let dims = budget::dimensions_for(
                        row.city.as_deref(),
                        row.zone.as_deref(),
                        row.category.as_deref(),
                    );
                    budget::consume(txn, &dims, window).await?;
                    Ok(row)
                })
            })
            .await?;

        info!(correction_id = %applied.id, correction_type = %applied.correction_type, scope = ?applied.scope, "correction applied");
        Ok(applied)
    }

    /// Restores the prior adjustment by applying a fresh correction carrying
    /// `prior_payload` as its own adjustment, and marks the original row
    /// reversed. The restoration correction is exempt from the budget gate:
    /// it undoes state the budget already charged for, it does not consume
    /// new headroom.
    pub async fn reverse(&self, id: CorrectionId) -> Result<(), CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let row = correction_store::lock_correction_for_update(txn, id)
                        .await?
                        .ok_or(CoreError::NotFound("correction"))?;
                    if row.reversed {
                        return Err(CoreError::InvalidState("correction already reversed"));
                    }

                    let restoration = CorrectionRow {
                        id: CorrectionId::new(),
                        correction_type: format!("{}_reversal", row.correction_type),
                        target_entity: row.target_entity.clone(),
                        target_id: row.target_id.clone(),
                        adjustment_payload: row.prior_payload.clone(),
                        prior_payload: row.adjustment_payload.clone(),
                        reason_code: format!("reversal_of:{}", row.id),
                        scope: row.scope,
                        zone: row.zone.clone(),
                        city: row.city.clone(),
                        category: row.category.clone(),
                        expires_at: now + Duration::hours(CORRECTION_MAX_TTL_HOURS),
                        reversed: false,
                        reversed_at: None,
                        verdict: None,
                        applied_at: now,
                    };
                    correction_store::insert_correction(txn, &restoration).await?;
                    correction_store::mark_reversed(txn, id, now).await?;

                    info!(correction_id = %id, restoration_id = %restoration.id, "correction reversed");
                    Ok(())
                })
            })
            .await
    }
}
