//! Bounded exponential backoff for quota errors
//!
//! Only [`LlmError::RateLimited`] is retried. The delay starts at the base
//! delay and doubles after every attempt; once `max_retries` retries have
//! failed the last error is returned as is.

use std::future::Future;
use std::time::Duration;

use quill_config::RetryConfig;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Backoff settings for rate-limited calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Retries after the initial attempt
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_retries: config.max_retries,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(retry))
    }

    /// Run `op`, retrying rate-limit failures with exponential backoff
    ///
    /// Cancellation during a backoff sleep ends the loop with
    /// [`LlmError::Cancelled`].
    pub async fn run<T, F, Fut>(&self, provider: &str, cancel: &CancellationToken, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut retry = 0;

        loop {
            match op().await {
                Err(e) if e.is_rate_limited() && retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    retry += 1;

                    tracing::warn!(
                        provider = %provider,
                        attempt = retry,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "rate limited, backing off"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(LlmError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_retries: 3,
        }
    }

    #[test]
    fn delays_double() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn default_matches_config_defaults() {
        assert_eq!(policy(), RetryPolicy::default());
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_rate_limit_propagates() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let started = Instant::now();

        let result: Result<(), _> = policy()
            .run("test", &CancellationToken::new(), || async move {
                counter.fetch_add(1, Ordering::Relaxed);
                Err(LlmError::RateLimited { retry_after: None })
            })
            .await;

        assert!(matches!(result, Err(LlmError::RateLimited { .. })));
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_rate_limit() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result = policy()
            .run("test", &CancellationToken::new(), || async move {
                if counter.fetch_add(1, Ordering::Relaxed) < 2 {
                    Err(LlmError::RateLimited { retry_after: Some(1) })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result: Result<(), _> = policy()
            .run("test", &CancellationToken::new(), || async move {
                counter.fetch_add(1, Ordering::Relaxed);
                Err(LlmError::Upstream("boom".to_owned()))
            })
            .await;

        assert!(matches!(result, Err(LlmError::Upstream(_))));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<(), _> = policy()
            .run("test", &token, || async { Err(LlmError::RateLimited { retry_after: None }) })
            .await;

        assert!(matches!(result, Err(LlmError::Cancelled)));
    }
}
