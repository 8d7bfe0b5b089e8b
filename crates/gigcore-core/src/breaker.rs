use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Consecutive-failure circuit breaker shared by external HTTP clients
/// (payment processor, vision vendor). Trips after `trip_threshold`
/// consecutive failures; a single probe call is allowed once `reset_after`
/// has elapsed, closing the breaker again on success.
pub struct CircuitBreaker {
    name: String,
    trip_threshold: u32,
    reset_after_secs: i64,
    consecutive_failures: AtomicU32,
    opened_at_unix: AtomicI64,
}

const NOT_OPEN: i64 = -1;

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, trip_threshold: u32, reset_after_secs: i64) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            trip_threshold,
            reset_after_secs,
            consecutive_failures: AtomicU32::new(0),
            opened_at_unix: AtomicI64::new(NOT_OPEN),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// True if the breaker currently rejects calls outright. A half-open
    /// probe is allowed through (returns false) once `reset_after_secs` has
    /// passed since trip, without closing the breaker preemptively.
    pub fn is_open(&self) -> bool {
        let opened_at = self.opened_at_unix.load(Ordering::SeqCst);
        if opened_at == NOT_OPEN {
            return false;
        }
        Self::now_unix() - opened_at < self.reset_after_secs
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.opened_at_unix.store(NOT_OPEN, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.trip_threshold {
            self.opened_at_unix
                .store(Self::now_unix(), Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures() {
        let breaker = CircuitBreaker::new("vision", 3, 30);
        assert!(!breaker.is_open());
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("vision", 3, 30);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open(), "two failures after a reset must not trip a threshold-3 breaker");
    }
}
