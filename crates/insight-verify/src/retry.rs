//! Retry with exponential back-off and jitter for ground-truth lookups.
//!
//! Mirrors the scraper-side policy: transient transport failures are worth
//! another attempt, claim failures (not-found, forbidden, redirected) are
//! answers and must be surfaced immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::VerifyError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
pub(crate) fn is_retriable(err: &VerifyError) -> bool {
    match err {
        VerifyError::RateLimited { .. } | VerifyError::Upstream { .. } => true,
        VerifyError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        VerifyError::NotFound { .. }
        | VerifyError::Forbidden { .. }
        | VerifyError::Redirected { .. }
        | VerifyError::NotConfigured { .. }
        | VerifyError::Deserialize { .. }
        | VerifyError::MalformedUrl { .. }
        | VerifyError::TooManyRedirects { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// transient errors. Delay doubles per attempt from `backoff_base_ms`,
/// ±25 % jitter, capped at 60 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, VerifyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VerifyError>>,
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
                    "transient verification error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
