//! Retry executor
//!
//! Runs a fetch with bounded exponential backoff. Only transient errors
//! are retried unless the policy is told to retry everything.

use super::error::SourceError;
use super::types::PollConfig;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff policy for balance fetches
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Cap on a single delay
    pub max_delay: Option<Duration>,
    /// Retry errors that are not transient
    pub retry_permanent_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: config.base_retry_delay,
            max_delay: config.max_retry_delay,
            retry_permanent_errors: config.retry_permanent_errors,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    ///
    /// `base_delay * 2^(attempt - 1)`, optionally capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .and_then(|multiplier| self.base_delay.checked_mul(multiplier))
            .unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    fn should_retry(&self, error: &SourceError, attempt: u32) -> bool {
        attempt < self.max_retries && (self.retry_permanent_errors || error.is_transient())
    }

    /// Invoke `fetch` until it succeeds or the policy gives up
    ///
    /// On give-up the error of the last attempt is returned as-is.
    pub async fn retry_fetch<T, F, Fut>(&self, label: &str, mut fetch: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 1;

        loop {
            match fetch().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(fetch = label, attempt, "Fetch succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if self.should_retry(&e, attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        fetch = label,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::debug!(fetch = label, attempt, error = %e, "Giving up on fetch");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1000),
            max_delay: None,
            retry_permanent_errors: false,
        }
    }

    #[test]
    fn test_delay_sequence() {
        let policy = policy(4);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_cap_and_overflow() {
        let mut policy = policy(4);
        assert_eq!(policy.delay_for_attempt(200), Duration::MAX);
        // 2^32 no longer fits the multiplier
        assert_eq!(policy.delay_for_attempt(33), Duration::MAX);
        assert_eq!(
            policy.delay_for_attempt(32),
            Duration::from_millis(1000) * (1u32 << 31)
        );

        policy.max_delay = Some(Duration::from_millis(1500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_spaced_exponentially() {
        let times = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&times);

        let result: Result<u64, _> = policy(4)
            .retry_fetch("test", || {
                recorded.lock().unwrap().push(Instant::now());
                async { Err(SourceError::Network("down".into())) }
            })
            .await;
        assert!(result.is_err());

        let times = times.lock().unwrap();
        assert_eq!(times.len(), 4);
        let gaps: Vec<u128> = times.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        assert_eq!(gaps, vec![1000, 2000, 4000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_original_error() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);

        let result: Result<u64, _> = policy(3)
            .retry_fetch("test", || {
                let n = {
                    let mut c = counter.lock().unwrap();
                    *c += 1;
                    *c
                };
                async move { Err(SourceError::Upstream(format!("failure {}", n))) }
            })
            .await;

        assert_eq!(result, Err(SourceError::Upstream("failure 3".into())));
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);

        let result = policy(3)
            .retry_fetch("test", || {
                let n = {
                    let mut c = counter.lock().unwrap();
                    *c += 1;
                    *c
                };
                async move {
                    if n < 2 {
                        Err(SourceError::Timeout)
                    } else {
                        Ok(99u64)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(99));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);

        let result: Result<u64, _> = policy(3)
            .retry_fetch("test", || {
                *counter.lock().unwrap() += 1;
                async { Err(SourceError::NotFound("0.0.1".into())) }
            })
            .await;

        assert_eq!(result, Err(SourceError::NotFound("0.0.1".into())));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_retried_when_configured() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        let mut policy = policy(3);
        policy.retry_permanent_errors = true;

        let _: Result<u64, _> = policy
            .retry_fetch("test", || {
                *counter.lock().unwrap() += 1;
                async { Err(SourceError::NotFound("0.0.1".into())) }
            })
            .await;

        assert_eq!(*calls.lock().unwrap(), 3);
    }
}
