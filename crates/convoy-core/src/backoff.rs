//! Retry pacing for the polling loops.
//!
//! A failed pass doubles the wait before the next one, up to a cap; a
//! successful pass restores the base interval. Failures never retry
//! sooner than [`MIN_RETRY`], even when the base interval is zero.

use std::time::Duration;

/// Shortest wait after a failed pass.
pub const MIN_RETRY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base).max(MIN_RETRY);
        Self {
            base,
            max,
            current: base,
            consecutive_failures: 0,
        }
    }

    /// Record a successful pass.
    pub fn succeed(&mut self) {
        self.consecutive_failures = 0;
        self.current = self.base;
    }

    /// Record a failed pass and return the wait before the next attempt.
    pub fn fail(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current = self.current.saturating_mul(2).max(MIN_RETRY).min(self.max);
        self.current
    }

    /// Wait before the next pass.
    pub fn next_interval(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_base() {
        let b = Backoff::new(Duration::from_secs(5), Duration::from_secs(60));
        assert_eq!(b.next_interval(), Duration::from_secs(5));
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn doubles_on_failure_and_caps() {
        let mut b = Backoff::new(Duration::from_secs(5), Duration::from_secs(60));
        assert_eq!(b.fail(), Duration::from_secs(10));
        assert_eq!(b.fail(), Duration::from_secs(20));
        assert_eq!(b.fail(), Duration::from_secs(40));
        assert_eq!(b.fail(), Duration::from_secs(60));
        assert_eq!(b.fail(), Duration::from_secs(60));
        assert_eq!(b.consecutive_failures(), 5);
    }

    #[test]
    fn resets_on_success() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        b.fail();
        b.fail();
        b.succeed();
        assert_eq!(b.next_interval(), Duration::from_secs(1));
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn zero_interval_still_backs_off() {
        let mut b = Backoff::new(Duration::ZERO, Duration::from_secs(8));
        assert_eq!(b.next_interval(), Duration::ZERO);
        assert_eq!(b.fail(), Duration::from_secs(1));
        assert_eq!(b.fail(), Duration::from_secs(2));
        assert_eq!(b.fail(), Duration::from_secs(4));
        b.succeed();
        assert_eq!(b.next_interval(), Duration::ZERO);

        let mut uncapped = Backoff::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(uncapped.fail(), MIN_RETRY);
    }

    #[test]
    fn huge_cap_does_not_overflow() {
        let mut b = Backoff::new(Duration::from_secs(u64::MAX / 2 + 1), Duration::from_secs(u64::MAX));
        assert_eq!(b.fail(), Duration::from_secs(u64::MAX));
        assert_eq!(b.fail(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn cap_never_below_base() {
        let mut b = Backoff::new(Duration::from_secs(30), Duration::from_secs(10));
        assert_eq!(b.fail(), Duration::from_secs(30));
    }
}
