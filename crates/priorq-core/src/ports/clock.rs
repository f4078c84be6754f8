//! Clock port.
//!
//! Wall-clock time is only used for record timestamps and ID generation;
//! timeouts and retry delays run on tokio's monotonic clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant. For tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_does_not_move() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
    }

    #[test]
    fn shared_clock_delegates() {
        let at = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(at));
        assert_eq!(clock.now(), at);
    }
}
