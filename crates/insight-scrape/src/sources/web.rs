//! Generic web page scraper for competitor and landing pages.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::ScrapeError;
use crate::normalize::{clean_content, extract_html_title, format_signal};
use crate::retry::retry_with_backoff;
use crate::sources::SignalScraper;
use crate::types::{ScrapeResult, SourceMetadata};

/// Scraper that fetches a fixed list of pages and normalizes them to text.
///
/// Pages serving identical content under different URLs (tracking params,
/// www/apex mirrors) are collapsed by a SHA-256 fingerprint of the cleaned
/// text.
pub struct WebScraper {
    client: reqwest::Client,
    urls: Vec<String>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl WebScraper {
    /// Create a scraper from app config plus the page URLs to fetch.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: &insight_core::AppConfig, urls: Vec<String>) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(config.http_user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            urls,
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_backoff_base_ms,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ScrapeError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let response = self.client.get(url).send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ScrapeError::NotFound {
                    url: url.to_owned(),
                });
            }
            if !status.is_success() {
                return Err(ScrapeError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_owned(),
                });
            }
            Ok(response.text().await?)
        })
        .await
    }
}

#[async_trait]
impl SignalScraper for WebScraper {
    fn source_name(&self) -> &'static str {
        "web"
    }

    async fn scrape(&self) -> Vec<ScrapeResult> {
        let mut results = Vec::new();
        let mut seen_fingerprints: HashSet<String> = HashSet::new();

        for url in &self.urls {
            let html = match self.fetch_page(url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "page fetch failed — skipping");
                    continue;
                }
            };

            match to_result(url, &html) {
                Ok(result) => {
                    let SourceMetadata::Web {
                        ref fingerprint, ..
                    } = result.metadata
                    else {
                        continue;
                    };
                    if seen_fingerprints.insert(fingerprint.clone()) {
                        results.push(result);
                    } else {
                        tracing::debug!(url = %url, "duplicate page content — skipping");
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "page normalization failed — skipping");
                }
            }
        }
        results
    }
}

fn to_result(url: &str, html: &str) -> Result<ScrapeResult, ScrapeError> {
    let text = clean_content(html);
    if text.is_empty() {
        return Err(ScrapeError::EmptyContent {
            url: url.to_owned(),
        });
    }

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let fingerprint = format!("{:x}", hasher.finalize());

    let title = extract_html_title(html).unwrap_or_else(|| url.to_owned());
    let content = format_signal(
        &title,
        &[("Source", "web".to_owned()), ("URL", url.to_owned())],
        &text,
    );

    ScrapeResult::new(
        url,
        title,
        content,
        SourceMetadata::Web {
            fingerprint,
            fetched_at: Utc::now(),
            extra: std::collections::BTreeMap::new(),
        },
    )
}
