//! Retry with exponential back-off and jitter for individual network calls.
//!
//! [`retry_with_backoff`] wraps one fallible async operation and retries on
//! transient errors (network failures, 429, 5xx). Permanent failures —
//! not-found, unexpected 4xx, malformed responses, missing configuration —
//! are returned immediately without any retry. Retries apply to individual
//! fetches, never to a scraper's whole `scrape()` run.

use std::future::Future;
use std::time::Duration;

use crate::error::ScrapeError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:**
/// - [`ScrapeError::RateLimited`] — the server has asked us to back off.
/// - [`ScrapeError::Http`] network-level failures: timeout, connection reset.
/// - [`ScrapeError::UnexpectedStatus`] with a 5xx status.
///
/// **Not retriable (hard stop):**
/// - [`ScrapeError::NotFound`] — retrying would return the same result.
/// - [`ScrapeError::UnexpectedStatus`] with a 4xx status.
/// - [`ScrapeError::Deserialize`] — malformed response; retrying won't fix it.
/// - [`ScrapeError::NotConfigured`] — missing credentials; no call was made.
/// - [`ScrapeError::EmptyContent`] — data-shape issue, not a transport one.
pub(crate) fn is_retriable(err: &ScrapeError) -> bool {
    match err {
        ScrapeError::RateLimited { .. } => true,
        ScrapeError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        ScrapeError::UnexpectedStatus { status, .. } => (500..600).contains(status),
        ScrapeError::NotFound { .. }
        | ScrapeError::Deserialize { .. }
        | ScrapeError::NotConfigured { .. }
        | ScrapeError::EmptyContent { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// Back-off schedule with `backoff_base_ms = 1_000`:
///
/// | Attempt | Sleep before next attempt        |
/// |---------|----------------------------------|
/// | 1       | 1 000 ms × 2⁰ ± 25 % jitter     |
/// | 2       | 1 000 ms × 2¹ ± 25 % jitter     |
/// | 3       | 1 000 ms × 2² ± 25 % jitter     |
///
/// Delay is capped at 60 s. Non-retriable errors are returned immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient scrape error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn rate_limited() -> ScrapeError {
        ScrapeError::RateLimited {
            source_name: "trends".to_owned(),
            retry_after_secs: 0,
        }
    }

    #[test]
    fn not_found_is_not_retriable() {
        assert!(!is_retriable(&ScrapeError::NotFound {
            url: "https://example.com".to_owned()
        }));
    }

    #[test]
    fn not_configured_is_not_retriable() {
        assert!(!is_retriable(&ScrapeError::NotConfigured {
            source_name: "reddit".to_owned(),
            reason: "missing credentials".to_owned(),
        }));
    }

    #[test]
    fn server_error_status_is_retriable() {
        assert!(is_retriable(&ScrapeError::UnexpectedStatus {
            status: 503,
            url: "https://example.com".to_owned()
        }));
        assert!(!is_retriable(&ScrapeError::UnexpectedStatus {
            status: 403,
            url: "https://example.com".to_owned()
        }));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ScrapeError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_rate_limited_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(rate_limited())
                } else {
                    Ok::<u32, ScrapeError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn propagates_last_error_after_exhausting_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScrapeError>(rate_limited())
            }
        })
        .await;
        // max_retries=2 → 3 total attempts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ScrapeError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_deserialize_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                let e = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
                Err::<u32, ScrapeError>(ScrapeError::Deserialize {
                    context: "test".to_owned(),
                    source: e,
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ScrapeError::Deserialize { .. })));
    }
}
