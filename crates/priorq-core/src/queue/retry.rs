//! Retry policy: decides back-off delays between attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay before retry `n` is `base_delay * multiplier^(n - 1)`, capped at
/// `max_delay`. The default retries immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl RetryPolicy {
    pub fn immediate() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    pub fn exponential(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: Duration::from_secs(300),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn is_immediate(&self) -> bool {
        self.base_delay.is_zero()
    }

    /// `retry` is the 1-based retry number (the first retry is 1).
    pub fn next_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_is_immediate() {
        let policy = RetryPolicy::default();
        assert!(policy.is_immediate());
        assert_eq!(policy.next_delay(1), Duration::ZERO);
        assert_eq!(policy.next_delay(7), Duration::ZERO);
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(4, 16)]
    fn exponential_backoff_increases(#[case] retry: u32, #[case] secs: u64) {
        let policy = RetryPolicy::exponential(Duration::from_secs(2), 2.0);
        assert_eq!(policy.next_delay(retry), Duration::from_secs(secs));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::exponential(Duration::from_secs(2), 2.0)
            .with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.next_delay(3), Duration::from_secs(5));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(Duration::from_millis(40));
        assert_eq!(policy.next_delay(1), Duration::from_millis(40));
        assert_eq!(policy.next_delay(5), Duration::from_millis(40));
    }
}
