use super::ExtractError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded-retry policy for connectivity-class failures only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Runs `op` up to `policy.attempts` times, sleeping `base_delay * 2^(n-1)`
/// between attempts. Only connectivity errors are retried; any other error
/// propagates immediately, and the last connectivity error propagates once
/// the budget is exhausted.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ExtractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let attempts = policy.attempts.max(1);
    let mut delay = policy.base_delay;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_connectivity() && attempt < attempts => {
                warn!(
                    target = "stylist.extract",
                    attempt,
                    error = %err,
                    "connectivity failure, backing off"
                );
                sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Composes a primary attempt with a single-shot fallback. The fallback runs
/// exactly once, only for fallback-eligible errors, and is not wrapped in
/// the retry loop.
pub async fn with_inline_fallback<T, F, Fut>(
    primary: impl Future<Output = Result<T, ExtractError>>,
    fallback: F,
) -> Result<T, ExtractError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    match primary.await {
        Err(err) if err.is_fallback_eligible() => {
            warn!(
                target = "stylist.extract",
                error = %err,
                "primary attempt failed, resubmitting with inline payload"
            );
            fallback().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn connect_err() -> ExtractError {
        ExtractError::Connect("connection reset".into())
    }

    #[tokio::test(start_paused = true)]
    async fn retries_connectivity_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(RetryPolicy::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 6 {
                    Err(connect_err())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(connect_err()) }
        })
        .await;
        assert!(matches!(result, Err(ExtractError::Connect(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn non_connectivity_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExtractError::InvalidImage("bad url".into())) }
        })
        .await;
        assert!(matches!(result, Err(ExtractError::InvalidImage(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_runs_once_for_eligible_errors() {
        let fallback_calls = AtomicU32::new(0);
        let result = with_inline_fallback(
            async { Err(ExtractError::InvalidImage("bad url".into())) },
            || {
                fallback_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7u32) }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_skipped_for_other_errors() {
        let fallback_calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_inline_fallback(
            async { Err(ExtractError::Gateway { status: 500, detail: "boom".into() }) },
            || {
                fallback_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7u32) }
            },
        )
        .await;
        assert!(matches!(result, Err(ExtractError::Gateway { .. })));
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_image_skips_retry_and_uses_fallback_once() {
        let primary_calls = AtomicU32::new(0);
        let fallback_calls = AtomicU32::new(0);
        let primary = with_retry(RetryPolicy::default(), || {
            primary_calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExtractError::InvalidImage("bad url".into())) }
        });
        let result = with_inline_fallback(primary, || {
            fallback_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("inline") }
        })
        .await;
        assert_eq!(result.unwrap(), "inline");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }
}
