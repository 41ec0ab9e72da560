//! Competitor URL validation.
//!
//! Syntactic checks run before any network I/O; reachable URLs are probed
//! with a lightweight HEAD request, following redirects manually so the
//! redirect count can be recorded and capped.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use url::Url;

use crate::cache::ValidationCache;
use crate::error::VerifyError;
use crate::types::{CacheStats, UrlValidation};

/// Validates URLs with bounded-concurrency batching and a process-local
/// cache keyed by normalized URL.
pub struct UrlValidator {
    client: reqwest::Client,
    max_redirects: usize,
    max_concurrent: usize,
    cache: ValidationCache<UrlValidation>,
}

impl UrlValidator {
    /// Create a validator from app config.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: &insight_core::AppConfig) -> Result<Self, VerifyError> {
        // Redirects are followed manually so the hop count is observable.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(config.http_user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            max_redirects: config.url_max_redirects,
            max_concurrent: config.url_max_concurrent.max(1),
            cache: ValidationCache::new(),
        })
    }

    /// Validate one URL, reusing any cached result for its normalized form.
    pub async fn validate(&self, raw: &str) -> UrlValidation {
        let subject = normalize_url(raw);

        let parsed = match check_syntax(&subject) {
            Ok(parsed) => parsed,
            Err(e) => {
                return UrlValidation {
                    subject,
                    verified: false,
                    final_url: None,
                    status: None,
                    redirect_count: 0,
                    latency_ms: None,
                    error: Some(e.to_string()),
                };
            }
        };

        self.cache
            .get_or_fetch(&subject, || {
                let subject = subject.clone();
                async move { self.probe(subject, parsed).await }
            })
            .await
    }

    /// Validate many URLs with at most `max_concurrent` in flight.
    ///
    /// Per-item failures stay in their own result; the batch itself always
    /// completes. Result order is not guaranteed.
    pub async fn validate_all(&self, urls: &[String]) -> Vec<UrlValidation> {
        stream::iter(urls)
            .map(|url| self.validate(url))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    /// Counts over the cached results.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        let values = self.cache.values();
        let valid = values.iter().filter(|v| v.verified).count();
        CacheStats {
            valid,
            invalid: values.len() - valid,
            total: values.len(),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// HEAD the URL, following redirects up to the configured maximum.
    async fn probe(&self, subject: String, start: Url) -> UrlValidation {
        let started = Instant::now();
        let mut current = start;
        let mut redirect_count = 0usize;

        loop {
            let response = match self.client.head(current.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    let reason = if e.is_timeout() {
                        "request timed out".to_owned()
                    } else if e.is_connect() {
                        format!("connection error: {e}")
                    } else {
                        format!("request error: {e}")
                    };
                    return failed(subject, redirect_count, reason);
                }
            };

            let status = response.status();
            if status.is_redirection() {
                if redirect_count >= self.max_redirects {
                    let e = VerifyError::TooManyRedirects {
                        url: subject.clone(),
                        limit: self.max_redirects,
                    };
                    return failed(subject, redirect_count, e.to_string());
                }
                let Some(location) = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                else {
                    return failed(
                        subject,
                        redirect_count,
                        format!("redirect status {status} without a Location header"),
                    );
                };
                current = match current.join(location) {
                    Ok(next) => next,
                    Err(e) => {
                        return failed(
                            subject,
                            redirect_count,
                            format!("invalid redirect target \"{location}\": {e}"),
                        );
                    }
                };
                redirect_count += 1;
                continue;
            }

            #[allow(clippy::cast_possible_truncation)]
            let latency_ms = started.elapsed().as_millis() as u64;
            let verified = status.as_u16() < 400;
            return UrlValidation {
                subject,
                verified,
                final_url: Some(current.to_string()),
                status: Some(status.as_u16()),
                redirect_count,
                latency_ms: Some(latency_ms),
                error: if verified {
                    None
                } else {
                    Some(format!("HTTP status {status}"))
                },
            };
        }
    }
}

fn failed(subject: String, redirect_count: usize, reason: String) -> UrlValidation {
    tracing::debug!(url = %subject, error = %reason, "url failed validation");
    UrlValidation {
        subject,
        verified: false,
        final_url: None,
        status: None,
        redirect_count,
        latency_ms: None,
        error: Some(reason),
    }
}

/// Prepend `https://` to schemeless input and strip one trailing slash.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };
    with_scheme.trim_end_matches('/').to_owned()
}

/// Syntactic gate: must parse, scheme must be http/https, host must be
/// present and look like a hostname. Runs before any network call.
fn check_syntax(normalized: &str) -> Result<Url, VerifyError> {
    let parsed = Url::parse(normalized).map_err(|e| VerifyError::MalformedUrl {
        url: normalized.to_owned(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(VerifyError::MalformedUrl {
                url: normalized.to_owned(),
                reason: format!("unsupported scheme \"{other}\""),
            });
        }
    }

    let Some(host) = parsed.host_str() else {
        return Err(VerifyError::MalformedUrl {
            url: normalized.to_owned(),
            reason: "missing host".to_owned(),
        });
    };
    if !host.contains('.') && host != "localhost" {
        return Err(VerifyError::MalformedUrl {
            url: normalized.to_owned(),
            reason: format!("host \"{host}\" is not a valid domain"),
        });
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_and_strips_trailing_slash() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("https://example.com/"), "https://example.com");
        assert_eq!(
            normalize_url(" http://example.com/pricing/ "),
            "http://example.com/pricing"
        );
    }

    #[test]
    fn check_syntax_rejects_garbage_before_network() {
        let err = check_syntax(&normalize_url("not a url")).unwrap_err();
        assert!(matches!(err, VerifyError::MalformedUrl { .. }));

        let err = check_syntax("ftp://example.com").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("scheme"), "unexpected message: {msg}");
    }

    #[test]
    fn check_syntax_requires_a_domain_like_host() {
        assert!(check_syntax("https://nodots").is_err());
        assert!(check_syntax("http://localhost").is_ok());
        assert!(check_syntax("https://example.com").is_ok());
    }
}
