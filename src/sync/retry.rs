//! Retry policy for remote pushes.

use std::time::Duration;
use crate::sync::remote::RemoteError;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff with base and max.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => *d,
            Self::Exponential { base, max } => {
                let multiplier = 2u32.saturating_pow(attempt);
                std::cmp::min(base.saturating_mul(multiplier), *max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(250),
            max: Duration::from_secs(5),
        }
    }
}

/// Bounded retry for a single remote call. Each attempt gets its own timeout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, attempt_timeout: Duration) -> Self {
        Self { max_retries, backoff: BackoffStrategy::default(), attempt_timeout }
    }

    /// A single attempt, no retries.
    pub fn none(attempt_timeout: Duration) -> Self {
        Self { max_retries: 0, backoff: BackoffStrategy::None, attempt_timeout }
    }

    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// `attempt` counts the attempts already made that failed with `error`.
    pub fn should_retry(&self, error: &RemoteError, attempt: u32) -> bool {
        attempt <= self.max_retries && error.is_retryable()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = BackoffStrategy::Exponential { base: Duration::from_millis(100), max: Duration::from_millis(350) };
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(backoff.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1));
        let timeout = RemoteError::Timeout(Duration::from_secs(1));
        assert!(policy.should_retry(&timeout, 1));
        assert!(policy.should_retry(&timeout, 2));
        assert!(!policy.should_retry(&timeout, 3));
        assert!(!policy.should_retry(&RemoteError::Rejected { status: 400 }, 1));
        assert!(!RetryPolicy::none(Duration::from_secs(1)).should_retry(&timeout, 1));
    }
}
