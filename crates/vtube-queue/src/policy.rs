//! Retry policy applied when a consumer reports a job failure.

use std::str::FromStr;
use std::time::Duration;

use crate::error::QueueError;

/// Back-off shape between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

impl FromStr for Backoff {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Backoff::Fixed),
            "exponential" => Ok(Backoff::Exponential),
            other => Err(QueueError::invalid_config(format!("unknown backoff: {}", other))),
        }
    }
}

/// Job options shared by every job the queue accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first delivery
    pub attempts: u32,
    pub backoff: Backoff,
    pub base_delay: Duration,
    /// Drop completed entries from the stream
    pub remove_on_complete: bool,
    /// Drop exhausted jobs instead of dead-lettering them
    pub remove_on_fail: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::Exponential,
            base_delay: Duration::from_millis(5000),
            remove_on_complete: true,
            remove_on_fail: false,
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            attempts: std::env::var("QUEUE_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default.attempts),
            backoff: std::env::var("QUEUE_BACKOFF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.backoff),
            base_delay: std::env::var("QUEUE_BACKOFF_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.base_delay),
            ..default
        }
    }

    /// Delay before the attempt that follows the given failed attempt.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let exp = failed_attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << exp)
            }
        }
    }

    /// Whether another attempt is allowed after the given failed attempt.
    pub fn should_retry(&self, failed_attempt: u32) -> bool {
        failed_attempt < self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.backoff, Backoff::Exponential);
        assert!(policy.remove_on_complete);
        assert!(!policy.remove_on_fail);
    }

    #[test]
    fn test_exponential_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(20));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy {
            backoff: Backoff::Fixed,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
    }

    #[test]
    fn test_should_retry_is_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("QUEUE_ATTEMPTS", "5");
        std::env::set_var("QUEUE_BACKOFF", "fixed");
        std::env::set_var("QUEUE_BACKOFF_DELAY_MS", "100");
        let policy = RetryPolicy::from_env();
        std::env::remove_var("QUEUE_ATTEMPTS");
        std::env::remove_var("QUEUE_BACKOFF");
        std::env::remove_var("QUEUE_BACKOFF_DELAY_MS");

        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.backoff, Backoff::Fixed);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
    }
}
