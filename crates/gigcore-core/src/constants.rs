//! Fixed numeric constants from the component design (§4.G, §4.H) plus the
//! outbox retry curve and fee table this implementation supplements (see
//! SPEC_FULL.md §1.2).

/// §4.G — stale inactive expertise rows younger than this are not eligible
/// for silent replacement; admission must reject with COOLDOWN instead.
pub const DECAY_COOLDOWN_DAYS: i64 = 7;

/// §4.G — a freshly admitted or promoted expertise row is locked for this
/// long before it can be changed again.
pub const EXPERTISE_LOCK_DAYS: i64 = 30;

/// §4.G — activity decay thresholds on `last_task_accepted_at`.
pub const DECAY_HALF_DAYS: i64 = 14;
pub const DECAY_ZERO_DAYS: i64 = 30;

/// §4.G — auto-expansion trigger: P95 accept latency window and minimum
/// sample size guarding against noise-driven expansion.
pub const AUTO_EXPAND_LOOKBACK_DAYS: i64 = 14;
pub const AUTO_EXPAND_P95_THRESHOLD_HOURS: i64 = 6;
pub const AUTO_EXPAND_MIN_SAMPLES: usize = 10;
pub const AUTO_EXPAND_PCT: f64 = 10.0;
pub const AUTO_EXPAND_DURATION_DAYS: i64 = 7;

/// §4.G — waitlist invitations expire after this long unanswered.
pub const WAITLIST_INVITE_EXPIRY_HOURS: i64 = 48;

/// §4.E — a dispute may only be opened within this window of `completed_at`
/// (Open Question (a) resolved: measured against `completed_at`, per source).
pub const DISPUTE_WINDOW_HOURS: i64 = 48;

/// §4.H — correction budgets, windowed on rounded hour boundaries.
pub const CORRECTION_BUDGET_GLOBAL_PER_HOUR: i64 = 100;
pub const CORRECTION_BUDGET_CITY_PER_HOUR: i64 = 30;
pub const CORRECTION_BUDGET_ZONE_PER_HOUR: i64 = 10;
pub const CORRECTION_BUDGET_CATEGORY_PER_HOUR: i64 = 15;

/// §4.H — every correction expires within this long; analyzer post-window
/// baselines use the same horizon.
pub const CORRECTION_MAX_TTL_HOURS: i64 = 24;

/// §4.H — matched control zones must have baseline metrics within this band.
pub const CORRECTION_BASELINE_MATCH_TOLERANCE: f64 = 0.10;

/// §4.H — rolling non-causal rate above this trips safe-mode.
pub const SAFE_MODE_NON_CAUSAL_RATE_THRESHOLD: f64 = 0.60;

/// §1.2 supplement — outbox dispatcher retry policy.
pub const OUTBOX_MAX_ATTEMPTS: i32 = 8;
pub const OUTBOX_BASE_BACKOFF_MS: i64 = 500;
pub const OUTBOX_MAX_BACKOFF_MS: i64 = 5 * 60 * 1000;

pub fn outbox_backoff_ms(attempts: i32) -> i64 {
    let scaled = OUTBOX_BASE_BACKOFF_MS.saturating_mul(1i64 << attempts.min(20).max(0));
    scaled.min(OUTBOX_MAX_BACKOFF_MS)
}

/// §1.2 supplement — default platform fee rate in basis points, per task
/// category; falls back to the default when a category has no entry.
pub const DEFAULT_FEE_BASIS_POINTS: u32 = 1500;

/// §4.I supplement — quiet hours are a fixed UTC window rather than a
/// per-user timezone preference, since no per-user schedule is modeled.
/// `security_alert` is the only category that bypasses this window.
pub const QUIET_HOURS_START_UTC_HOUR: u32 = 22;
pub const QUIET_HOURS_END_UTC_HOUR: u32 = 8;

/// §4.I — admin-id cache TTL for the admin-broadcast fan-out.
pub const ADMIN_ID_CACHE_TTL_SECS: u64 = 5 * 60;

pub fn fee_basis_points_for_category(category: &str) -> u32 {
    match category {
        "moving" | "heavy_labor" => 1200,
        "cleaning" | "handyman" => 1500,
        "delivery" | "errands" => 1800,
        _ => DEFAULT_FEE_BASIS_POINTS,
    }
}

/// §4.G — expertise slot weights.
pub const PRIMARY_WEIGHT: f64 = 0.7;
pub const SECONDARY_WEIGHT: f64 = 0.3;

/// §4.G — a user may hold at most this many active expertise rows (I8).
pub const MAX_ACTIVE_EXPERTISE: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        assert_eq!(outbox_backoff_ms(0), 500);
        assert_eq!(outbox_backoff_ms(1), 1000);
        assert_eq!(outbox_backoff_ms(10), OUTBOX_MAX_BACKOFF_MS);
    }

    #[test]
    fn unknown_category_falls_back_to_default() {
        assert_eq!(fee_basis_points_for_category("skydiving_instruction"), DEFAULT_FEE_BASIS_POINTS);
    }
}
