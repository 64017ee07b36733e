//! Bounded retry for capability calls.
//!
//! Every failure consumes an attempt. Only rate-limit or overload failures
//! sleep before the next attempt, for `RetryConfig::delay_for_attempt`.

use std::future::Future;

use tracing::warn;

use aira_core::config::RetryConfig;
use aira_core::error::AiraError;

/// Run `op` up to `policy.max_attempts` times, returning the first success
/// or the last error.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, AiraError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AiraError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                warn!(operation, attempt, attempts, error = %e, "Capability call failed");
                if attempt >= attempts {
                    return Err(e);
                }
                backoff(policy, attempt - 1, &e).await;
            }
        }
    }
}

/// Sleep before retrying if `error` is a rate-limit failure.
pub async fn backoff(policy: &RetryConfig, attempt: u32, error: &AiraError) {
    if error.is_rate_limited() {
        let delay = policy.delay_for_attempt(attempt);
        warn!(delay_ms = delay.as_millis() as u64, "Rate limited, backing off");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_first_success() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(&fast(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AiraError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_rate_limits() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(&fast(), "test", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(AiraError::RateLimited("429".into()))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_rate_limit_failures_consume_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AiraError::Completion("bad request".into()))
        })
        .await;
        assert!(matches!(result, Err(AiraError::Completion(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_rate_limit_failures_do_not_sleep() {
        let slow = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10_000,
            max_delay_ms: 10_000,
        };
        let started = Instant::now();
        let result: Result<(), _> = with_retry(&slow, "test", || async {
            Err(AiraError::Search("unreachable".into()))
        })
        .await;
        assert!(result.is_err());
        assert!(started.elapsed().as_secs() < 5);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let policy = RetryConfig {
            max_attempts: 0,
            ..fast()
        };
        let calls = &AtomicU32::new(0);
        let _ = with_retry(&policy, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(AiraError::Timeout(1))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
