//! Exponential backoff retry for transient API failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{ApiError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
    /// Add up to half the delay at random
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: cfg.max_delay_ms.map(Duration::from_millis),
            jitter: cfg.jitter,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Deterministic part of the delay before retry number `attempt` (0-based).
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if !self.jitter {
            return delay;
        }
        let half_ms = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = rand::rng().random_range(0..=half_ms);
        delay.saturating_add(Duration::from_millis(jitter))
    }
}

/// Retry when the error is a 429 or 5xx.
pub fn retry_transient(err: &ApiError) -> bool {
    err.is_retryable()
}

/// Run `f`, retrying while `should_retry` accepts the error and attempts remain.
///
/// The last error is returned unchanged once retries run out.
pub async fn retry_with_backoff<F, Fut, T, P>(policy: &RetryPolicy, should_retry: P, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&ApiError) -> bool,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && should_retry(&err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: None,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let mut p = policy(5);
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(800));
        p.max_delay = Some(Duration::from_millis(300));
        assert_eq!(p.delay_for(3), Duration::from_millis(300));
        assert_eq!(p.delay_for(40), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_within_half() {
        let p = RetryPolicy {
            jitter: true,
            ..policy(3)
        };
        for _ in 0..50 {
            let d = p.delay_for(1);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(300));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let c = Arc::clone(&calls);
        let out = retry_with_backoff(&policy(3), retry_transient, || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::http(429, "slow down"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let err = retry_with_backoff(&policy(3), retry_transient, || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ApiError::http(404, "missing")) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let err = retry_with_backoff(&policy(2), retry_transient, || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(ApiError::http(500, format!("attempt {n}"))) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err, ApiError::http(500, "attempt 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let _ = retry_with_backoff(&policy(2), |_| false, || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ApiError::http(503, "down")) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
