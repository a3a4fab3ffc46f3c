//! Bounded retry with exponential backoff

use crate::config::Config;
use std::time::Duration;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again
    Backoff(Duration),
    /// Surface the failure to the caller
    GiveUp,
}

/// Attempt budget and backoff schedule.
///
/// Attempts are numbered from 0. Delays are `base * 2^attempt`, so with a
/// one second base the sleeps are 1s, 2s, 4s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    base: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, base: Duration) -> Self {
        Self { retries, base }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry_count, config.backoff_base)
    }

    /// Total number of attempts, first one included
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn is_final(&self, attempt: u32) -> bool {
        attempt >= self.retries
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Decide after a failure on `attempt`.
    pub fn decide(&self, attempt: u32, retryable: bool) -> RetryDecision {
        if retryable && !self.is_final(attempt) {
            RetryDecision::Backoff(self.delay(attempt))
        } else {
            RetryDecision::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_from_base() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_two_retries_means_three_attempts_and_two_sleeps() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 3);

        let decisions: Vec<_> = (0..policy.max_attempts())
            .map(|attempt| policy.decide(attempt, true))
            .collect();
        assert_eq!(
            decisions,
            vec![
                RetryDecision::Backoff(Duration::from_millis(10)),
                RetryDecision::Backoff(Duration::from_millis(20)),
                RetryDecision::GiveUp,
            ]
        );
    }

    #[test]
    fn test_terminal_failures_never_retry() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        assert_eq!(policy.decide(0, false), RetryDecision::GiveUp);
    }

    #[test]
    fn test_zero_retries() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.decide(0, true), RetryDecision::GiveUp);
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), u32::MAX);
        assert!(policy.delay(40) >= policy.delay(31));
    }
}
