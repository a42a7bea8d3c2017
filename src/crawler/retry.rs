use crate::config::{BackoffKind, RetryConfig};
use crate::FetchError;
use std::time::Duration;

/// Retry schedule for a single page
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (1 for the first retry)
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        if self.backoff == BackoffKind::Fixed {
            return self.initial_backoff.min(self.max_backoff);
        }

        // Doubles per retry
        let exponent = retry.saturating_sub(1).min(31);
        let backoff = self.initial_backoff.saturating_mul(1u32 << exponent);
        backoff.min(self.max_backoff)
    }

    /// Backoff that also honors a server-supplied `Retry-After`, capped at `max_backoff`
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self.calculate_backoff(retry);
        match retry_after {
            Some(hint) => computed.max(hint).min(self.max_backoff),
            None => computed,
        }
    }

    /// Whether another attempt should follow `attempts_made` failed attempts
    pub fn should_retry(&self, attempts_made: u32, error: &FetchError) -> bool {
        error.is_retryable() && attempts_made < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            backoff: BackoffKind::Exponential,
            initial_backoff: Duration::from_millis(600),
            max_backoff: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_calculate_backoff_exponential() {
        let policy = exponential();
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(600));
        assert_eq!(policy.calculate_backoff(2), Duration::from_millis(1200));
        // Capped
        assert_eq!(policy.calculate_backoff(3), Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(40), Duration::from_secs(2));
    }

    #[test]
    fn test_calculate_backoff_fixed() {
        let policy = RetryPolicy {
            backoff: BackoffKind::Fixed,
            ..exponential()
        };
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(600));
        assert_eq!(policy.calculate_backoff(3), Duration::from_millis(600));
    }

    #[test]
    fn test_retry_after_raises_but_is_capped() {
        let policy = exponential();
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(120))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_should_retry_only_transient_errors() {
        let policy = exponential();
        assert!(policy.should_retry(1, &FetchError::transient("timeout")));
        assert!(!policy.should_retry(4, &FetchError::transient("timeout")));
        assert!(!policy.should_retry(1, &FetchError::client_rejected(403, "Forbidden")));
        assert!(!policy.should_retry(1, &FetchError::parse("layout changed")));
        assert!(!RetryPolicy::none().should_retry(1, &FetchError::transient("x")));
    }
}
