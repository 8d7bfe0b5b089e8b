use chrono::{DateTime, Utc};

/// Time authority seam. Production code uses the DB clock (see
/// `gigcore-store`'s `now()` query); this trait lets pure logic and tests
/// inject a fixed instant instead of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
