//! Retry Strategy Module
//!
//! Pluggable backoff policies for bounded retries.

use std::time::Duration;

// == Retry Strategy ==
/// Supplies the sleep before each retry.
///
/// `next` returns `Some(interval)` to continue and `None` to stop. Once it
/// has returned `None` it keeps returning `None` until `reset` is called.
pub trait RetryStrategy: Send {
    fn next(&mut self) -> Option<Duration>;

    /// Restores the full attempt budget.
    fn reset(&mut self);
}

// == Fixed Interval ==
/// Retries up to `max_retries` times with a constant interval.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    interval: Duration,
    max_retries: u32,
    attempts: u32,
}

impl FixedInterval {
    pub fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            max_retries,
            attempts: 0,
        }
    }

    /// Retries consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl RetryStrategy for FixedInterval {
    fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_retries {
            return None;
        }
        self.attempts += 1;
        Some(self.interval)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

// == Exponential Backoff ==
/// Doubles the interval on every retry, capped at `max_interval`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max_interval: Duration,
    max_retries: u32,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max_interval: Duration, max_retries: u32) -> Self {
        Self {
            initial,
            max_interval,
            max_retries,
            attempts: 0,
        }
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(self.attempts).unwrap_or(u32::MAX);
        self.attempts += 1;
        Some(
            self.initial
                .checked_mul(factor)
                .unwrap_or(self.max_interval)
                .min(self.max_interval),
        )
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_interval_exhausts() {
        let mut retry = FixedInterval::new(Duration::from_millis(10), 2);
        assert_eq!(retry.next(), Some(Duration::from_millis(10)));
        assert_eq!(retry.next(), Some(Duration::from_millis(10)));
        assert_eq!(retry.next(), None);
        assert_eq!(retry.attempts(), 2);
    }

    #[test]
    fn test_fixed_interval_stays_exhausted_until_reset() {
        let mut retry = FixedInterval::new(Duration::from_millis(1), 1);
        assert!(retry.next().is_some());
        for _ in 0..5 {
            assert_eq!(retry.next(), None);
        }
        retry.reset();
        assert!(retry.next().is_some());
    }

    #[test]
    fn test_zero_retries() {
        let mut retry = FixedInterval::new(Duration::from_millis(1), 0);
        assert_eq!(retry.next(), None);
    }

    #[test]
    fn test_exponential_backoff_doubles_and_caps() {
        let mut retry =
            ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(50), 5);
        assert_eq!(retry.next(), Some(Duration::from_millis(10)));
        assert_eq!(retry.next(), Some(Duration::from_millis(20)));
        assert_eq!(retry.next(), Some(Duration::from_millis(40)));
        assert_eq!(retry.next(), Some(Duration::from_millis(50)));
        assert_eq!(retry.next(), Some(Duration::from_millis(50)));
        assert_eq!(retry.next(), None);
        assert_eq!(retry.next(), None);
    }

    #[test]
    fn test_exponential_backoff_large_attempts_do_not_overflow() {
        let mut retry = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30), 64);
        let mut last = Duration::ZERO;
        while let Some(interval) = retry.next() {
            last = interval;
        }
        assert_eq!(last, Duration::from_secs(30));
    }
}
