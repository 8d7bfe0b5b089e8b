use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gigcore_core::constants::{
    CORRECTION_BASELINE_MATCH_TOLERANCE, CORRECTION_MAX_TTL_HOURS, SAFE_MODE_NON_CAUSAL_RATE_THRESHOLD,
};
use gigcore_core::error::CoreError;
use gigcore_core::model::{CorrectionRow, CorrectionVerdict};
use gigcore_store::tasks::TaskMetricsSnapshot;
use gigcore_store::{correction as correction_store, Store};
use tracing::{info, warn};

/// Runs the post-window causal-impact pass over corrections awaiting a
/// verdict (§4.H), then checks the rolling non-causal rate and flips
/// safe-mode when it crosses the threshold.
pub struct CausalAnalyzer {
    store: Arc<Store>,
}

struct MetricDeltas {
    fill: f64,
    completion: f64,
    dispute: f64,
}

/// Lower dispute rate is the improvement, so its sign is flipped here:
/// "positive" consistently means "moved in the desirable direction" for
/// all three metrics.
fn deltas(baseline: TaskMetricsSnapshot, post: TaskMetricsSnapshot) -> MetricDeltas {
    MetricDeltas {
        fill: post.fill_rate - baseline.fill_rate,
        completion: post.completion_rate - baseline.completion_rate,
        dispute: baseline.dispute_rate - post.dispute_rate,
    }
}

impl CausalAnalyzer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Returns the number of corrections given a verdict this pass.
    pub async fn run(&self) -> Result<u64, CoreError> {
        let now = self.store.now().await?;
        let pending = self.store.corrections_pending_verdict(now).await?;
        let mut processed = 0u64;

        for correction in pending {
            let verdict = self.verdict_for(&correction).await?;
            let id = correction.id;
            self.store
                .in_txn(move |txn| {
                    Box::pin(async move { correction_store::set_verdict(txn, id, verdict).await })
                })
                .await?;
            info!(correction_id = %id, verdict = ?verdict, "correction verdict recorded");
            processed += 1;
        }

        if processed > 0 {
            self.recheck_safe_mode(now).await?;
        }
        Ok(processed)
    }

    /// Gathers treated/control deltas over the correction's own post-window
    /// and returns a deterministic verdict (§4.H).
    async fn verdict_for(&self, correction: &CorrectionRow) -> Result<CorrectionVerdict, CoreError> {
        let Some(treated_category) = correction.category.as_deref() else {
            return Ok(CorrectionVerdict::Inconclusive);
        };

        let window_len = correction.expires_at - correction.applied_at;
        let baseline_start = correction.applied_at - window_len;
        let baseline_end = correction.applied_at;

        let treated_baseline = self
            .store
            .task_metrics_for_category(treated_category, baseline_start, baseline_end)
            .await?;
        let treated_post = self
            .store
            .task_metrics_for_category(treated_category, correction.applied_at, correction.expires_at)
            .await?;
        let treated_delta = deltas(treated_baseline, treated_post);

        let candidates = self
            .store
            .corrections_of_type_excluding_zone(
                &correction.correction_type,
                correction.zone.as_deref().unwrap_or(""),
                correction.applied_at,
                correction.expires_at,
            )
            .await?;

        let mut matched_control_category = None;
        for candidate in candidates {
            let Some(control_category) = candidate.category.as_deref() else {
                continue;
            };
            let candidate_baseline = self
                .store
                .task_metrics_for_category(control_category, candidate.applied_at - window_len, candidate.applied_at)
                .await?;
            let tolerance =
                treated_baseline.fill_rate.max(candidate_baseline.fill_rate) * CORRECTION_BASELINE_MATCH_TOLERANCE;
            if (candidate_baseline.fill_rate - treated_baseline.fill_rate).abs() <= tolerance + f64::EPSILON {
                matched_control_category = Some(control_category.to_string());
                break;
            }
        }

        let Some(control_category) = matched_control_category else {
            return Ok(CorrectionVerdict::Inconclusive);
        };

        let control_baseline = self
            .store
            .task_metrics_for_category(&control_category, baseline_start, baseline_end)
            .await?;
        let control_post = self
            .store
            .task_metrics_for_category(&control_category, correction.applied_at, correction.expires_at)
            .await?;
        let control_delta = deltas(control_baseline, control_post);

        let net_lifts = [
            treated_delta.fill - control_delta.fill,
            treated_delta.completion - control_delta.completion,
            treated_delta.dispute - control_delta.dispute,
        ];
        let positive_count = net_lifts.iter().filter(|&&lift| lift > 0.0).count();

        Ok(if positive_count >= 2 {
            CorrectionVerdict::Causal
        } else {
            CorrectionVerdict::NonCausal
        })
    }

    async fn recheck_safe_mode(&self, now: DateTime<Utc>) -> Result<(), CoreError> {
        let since = now - Duration::hours(CORRECTION_MAX_TTL_HOURS);
        let (total, non_causal) = self.store.recent_verdict_counts(since).await?;
        if total == 0 {
            return Ok(());
        }
        let rate = non_causal as f64 / total as f64;
        if rate > SAFE_MODE_NON_CAUSAL_RATE_THRESHOLD {
            self.store.set_safe_mode(true, "causal_analyzer").await?;
            warn!(rate, total, non_causal, "rolling non-causal rate tripped safe-mode");
        } else {
            info!(rate, total, non_causal, "rolling non-causal rate within bounds");
        }
        Ok(())
    }
}
