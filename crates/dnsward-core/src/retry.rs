//! Bounded exponential backoff for provider calls

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::Result;

/// Run `call` with bounded exponential backoff
///
/// Only transient errors are retried; a permanent error is returned
/// immediately. The delay before retry `n` (0-based) is
/// `base_delay_ms * 2^n`, capped at `max_delay_ms`.
pub async fn with_backoff<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < config.max_attempts => {
                let exp = config
                    .base_delay_ms
                    .saturating_mul(1u64.checked_shl(attempt as u32).unwrap_or(u64::MAX));
                let delay = exp.min(config.max_delay_ms);
                warn!(
                    %operation,
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts,
                    delay_ms = delay,
                    error = %err,
                    "Transient error, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_config(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicUsize::new(0);
        let result = with_backoff(&quick_config(3), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicUsize::new(0);
        let result = with_backoff(&quick_config(3), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::http("503"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_backoff(&quick_config(3), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::rate_limited("429")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_backoff(&quick_config(5), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::auth("bad token")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
