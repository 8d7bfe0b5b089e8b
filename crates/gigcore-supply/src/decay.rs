use std::sync::Arc;

use chrono::{Duration, Utc};
use gigcore_core::constants::{
    AUTO_EXPAND_DURATION_DAYS, AUTO_EXPAND_MIN_SAMPLES, AUTO_EXPAND_PCT, AUTO_EXPAND_P95_THRESHOLD_HOURS,
    AUTO_EXPAND_LOOKBACK_DAYS, DECAY_HALF_DAYS, DECAY_ZERO_DAYS,
};
use gigcore_core::error::CoreError;
use gigcore_store::{supply as supply_store, Store};
use tracing::info;

/// Daily recompute (§4.G): activity decay on every active `user_expertise`
/// row, then the auto-expansion P95 check on every capacity row. Each row
/// is updated under its own lock rather than one large transaction, since
/// the recompute is best-effort and a single row's failure should not
/// block the rest of the sweep.
pub struct DecayEngine {
    store: Arc<Store>,
}

impl DecayEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Returns the number of rows whose effective weight changed.
    pub async fn recompute_decay(&self) -> Result<u64, CoreError> {
        let now = Utc::now();
        let rows = supply_store::list_all_active_user_expertise(&self.store).await?;
        let mut changed = 0u64;

        for row in rows {
            let reference = row.last_task_accepted_at.unwrap_or(row.created_at);
            let age = now - reference;
            let new_effective_weight = if row.last_task_accepted_at.is_some() {
                if age > Duration::days(DECAY_ZERO_DAYS) {
                    0.0
                } else if age > Duration::days(DECAY_HALF_DAYS) {
                    row.slot_weight * 0.5
                } else {
                    row.slot_weight
                }
            } else if age > Duration::days(DECAY_HALF_DAYS) {
                row.slot_weight * 0.5
            } else {
                row.slot_weight
            };

            if (new_effective_weight - row.effective_weight).abs() < f64::EPSILON {
                continue;
            }

            let user_id = row.user_id;
            let expertise_id = row.expertise_id;
            let zone = row.zone.clone();
            let delta = new_effective_weight - row.effective_weight;
            self.store
                .in_txn(move |txn| {
                    Box::pin(async move {
                        let mut locked = supply_store::lock_user_expertise_for_update(txn, row.id)
                            .await?
                            .ok_or(CoreError::NotFound("user_expertise"))?;
                        if !locked.active {
                            return Ok(());
                        }
                        locked.effective_weight = new_effective_weight;
                        supply_store::update_user_expertise(txn, &locked).await?;

                        let mut capacity = supply_store::lock_capacity_for_update(txn, expertise_id, &zone)
                            .await?
                            .ok_or(CoreError::NotFound("capacity"))?;
                        let expected_version = capacity.version;
                        capacity.current_weight += delta;
                        supply_store::update_capacity(txn, &capacity, expected_version).await?;
                        Ok(())
                    })
                })
                .await?;
            changed += 1;
            info!(user_id = %user_id, expertise_id = %expertise_id, new_effective_weight, "activity decay applied");
        }
        Ok(changed)
    }

    /// Sets `auto_expand_pct`/`auto_expand_expires_at` on any capacity row
    /// whose P95 accept latency over the lookback window exceeds the
    /// threshold, guarded by a minimum sample size to avoid noise-driven
    /// expansion.
    pub async fn recompute_auto_expansion(&self) -> Result<u64, CoreError> {
        let now = Utc::now();
        let since = now - Duration::days(AUTO_EXPAND_LOOKBACK_DAYS);
        let capacities = supply_store::list_all_capacity(&self.store).await?;
        let mut expanded = 0u64;

        for capacity in capacities {
            let mut samples =
                supply_store::accept_latencies_seconds(&self.store, capacity.expertise_id, &capacity.zone, since)
                    .await?;
            if samples.len() < AUTO_EXPAND_MIN_SAMPLES {
                continue;
            }
            let p95 = percentile_95(&mut samples);
            if p95 <= (AUTO_EXPAND_P95_THRESHOLD_HOURS * 3600) as f64 {
                continue;
            }

            let expertise_id = capacity.expertise_id;
            let zone = capacity.zone.clone();
            self.store
                .in_txn(move |txn| {
                    Box::pin(async move {
                        let mut locked = supply_store::lock_capacity_for_update(txn, expertise_id, &zone)
                            .await?
                            .ok_or(CoreError::NotFound("capacity"))?;
                        let expected_version = locked.version;
                        locked.auto_expand_pct = AUTO_EXPAND_PCT;
                        locked.auto_expand_expires_at = Some(now + Duration::days(AUTO_EXPAND_DURATION_DAYS));
                        supply_store::update_capacity(txn, &locked, expected_version).await?;
                        Ok(())
                    })
                })
                .await?;
            expanded += 1;
            info!(expertise_id = %capacity.expertise_id, zone = %capacity.zone, p95_seconds = p95, "auto-expansion triggered");
        }
        Ok(expanded)
    }
}

fn percentile_95(samples: &mut [f64]) -> f64 {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((samples.len() as f64) * 0.95).ceil() as usize;
    samples[idx.saturating_sub(1).min(samples.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_95_picks_near_tail() {
        let mut samples: Vec<f64> = (1..=100).map(|n| n as f64).collect();
        assert_eq!(percentile_95(&mut samples), 95.0);
    }
}
