//! Retry policy for upstream model calls
//!
//! Only errors classified by [`AppError::is_retryable`] are retried, and at
//! most `max_attempts` calls are made in total.

use crate::errors::{AppError, Result};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff used by the embedding and chat clients
pub fn default_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(Duration::from_secs(8))
        .with_max_elapsed_time(Some(Duration::from_secs(60)))
        .build()
}

/// Run `op` until it succeeds, fails permanently or uses up its attempts
pub async fn retry_transient<T, F, Fut>(
    label: &'static str,
    policy: ExponentialBackoff,
    max_attempts: u32,
    op: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let attempts = AtomicU32::new(0);
    let attempts = &attempts;
    let op = &op;

    let result = backoff::future::retry(policy, || async move {
        let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
        op().await.map_err(|e: AppError| {
            if e.is_retryable() && attempt < max_attempts {
                warn!(label, attempt, max_attempts, error = %e, "Upstream request failed, retrying");
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(e)
            }
        })
    })
    .await;

    debug!(label, attempts = attempts.load(Ordering::Relaxed), ok = result.is_ok(), "Upstream request finished");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(1))
            .with_max_interval(Duration::from_millis(2))
            .with_max_elapsed_time(Some(Duration::from_secs(5)))
            .build()
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_transient("embeddings", fast_policy(), 5, || async {
            calls.fetch_add(1, Ordering::Relaxed);
            Err(AppError::EmbeddingError {
                message: "API error 401 Unauthorized".to_string(),
                status: Some(401),
            })
        })
        .await;

        assert!(matches!(result, Err(AppError::EmbeddingError { status: Some(401), .. })));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_transient_error_stops_at_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_transient("embeddings", fast_policy(), 3, || async {
            calls.fetch_add(1, Ordering::Relaxed);
            Err(AppError::EmbeddingError {
                message: "API error 503".to_string(),
                status: Some(503),
            })
        })
        .await;

        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_throttling() {
        let calls = AtomicU32::new(0);
        let result = retry_transient("chat", fast_policy(), 3, || async {
            if calls.fetch_add(1, Ordering::Relaxed) == 0 {
                Err(AppError::LlmError {
                    message: "slow down".to_string(),
                    status: Some(429),
                })
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
