//! Bounded retry for whole-request attempts
//!
//! Retries are applied only by the orchestrating client, around whole
//! attempts against the primary transport, and only for transport-level
//! transient failures. Parse errors and received HTTP statuses are never
//! retried.

use std::time::Duration;

use rand::Rng;

use crate::error::{Result, TransportError};

/// Backoff strategy for inter-attempt delays
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// Fixed delay between attempts (the default)
    Fixed { delay: Duration },
    /// Exponential increase in delay
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
    /// Full jitter: uniform random up to the exponential cap
    FullJitter {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Fixed {
            delay: Duration::from_millis(1000),
        }
    }
}

impl BackoffStrategy {
    pub fn fixed(delay: Duration) -> Self {
        BackoffStrategy::Fixed { delay }
    }

    pub fn exponential(initial: Duration, multiplier: f64, max: Duration) -> Self {
        BackoffStrategy::Exponential {
            initial,
            multiplier,
            max,
        }
    }

    /// Calculate the delay before retrying after `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed { delay } => *delay,

            BackoffStrategy::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let delay_ms = initial.as_millis() as f64 * multiplier.powi(attempt as i32);
                Duration::from_millis(delay_ms as u64).min(*max)
            }

            BackoffStrategy::FullJitter {
                initial,
                multiplier,
                max,
            } => {
                let exponential_ms = initial.as_millis() as f64 * multiplier.powi(attempt as i32);
                let capped_ms = (exponential_ms as u64).min(max.as_millis() as u64);
                let mut rng = rand::thread_rng();
                Duration::from_millis(rng.gen_range(0..=capped_ms.max(1)))
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, first try included (1 = no retries)
    pub max_attempts: u32,
    /// Backoff strategy between attempts
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether another attempt should be made after `error` on the 0-based
    /// `attempt`. Only connection-level transient failures qualify.
    pub fn should_retry(&self, error: &TransportError, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts && error.is_retriable()
    }
}

/// Execute `operation` with bounded retries per `policy`, sleeping between
/// attempts.
pub fn with_retry<T, F>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !policy.should_retry(&error, attempt) {
                    return Err(error);
                }
                let delay = policy.backoff.delay(attempt);
                tracing::debug!(
                    attempt = attempt + 1,
                    max = policy.max_attempts,
                    ?delay,
                    %error,
                    "retrying after transient failure"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn transient() -> TransportError {
        TransportError::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        ))
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_backoff(BackoffStrategy::fixed(Duration::from_millis(1)))
    }

    #[test]
    fn test_fixed_backoff() {
        let strategy = BackoffStrategy::fixed(Duration::from_millis(100));
        assert_eq!(strategy.delay(0), Duration::from_millis(100));
        assert_eq!(strategy.delay(5), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff() {
        let strategy =
            BackoffStrategy::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(10));
        assert_eq!(strategy.delay(0), Duration::from_millis(100));
        assert_eq!(strategy.delay(1), Duration::from_millis(200));
        assert_eq!(strategy.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_exponential_backoff_cap() {
        let strategy = BackoffStrategy::exponential(
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(500),
        );
        assert_eq!(strategy.delay(10), Duration::from_millis(500));
    }

    #[test]
    fn test_default_policy_is_three_fixed_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff.delay(0), Duration::from_millis(1000));
    }

    #[test]
    fn test_fails_twice_then_succeeds_within_three_attempts() {
        let mut calls = 0;
        let result = with_retry(&fast_policy(3), || {
            calls += 1;
            if calls < 3 {
                Err(transient())
            } else {
                Ok("ok")
            }
        });

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhausts_attempts_and_fails() {
        let mut calls = 0;
        let result: Result<()> = with_retry(&fast_policy(2), || {
            calls += 1;
            Err(transient())
        });

        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_never_retries_protocol_errors() {
        let mut calls = 0;
        let result: Result<()> = with_retry(&fast_policy(5), || {
            calls += 1;
            Err(TransportError::MalformedStatusLine {
                line: "garbage".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_no_retry_policy() {
        let mut calls = 0;
        let result: Result<()> = with_retry(&RetryPolicy::no_retry(), || {
            calls += 1;
            Err(transient())
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
