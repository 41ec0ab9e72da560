//! Search-trend scraper for a Google-Trends-style interest API.
//!
//! The upstream API is rate limited per caller, so keywords are batched
//! (default 5 per request) with a fixed inter-batch delay, and 429
//! responses go through the jittered back-off in [`crate::retry`].

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::normalize::format_signal;
use crate::retry::retry_with_backoff;
use crate::sources::SignalScraper;
use crate::types::{ScrapeResult, SourceMetadata};

const DEFAULT_BASE_URL: &str = "https://trends.google.com/trends";

#[derive(Debug, Deserialize)]
struct InterestResponse {
    default: InterestDefault,
}

#[derive(Debug, Deserialize)]
struct InterestDefault {
    #[serde(rename = "timelineData")]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    /// One relative-interest value (0-100) per requested keyword.
    value: Vec<f64>,
}

/// Scraper producing one interest-over-time signal per configured keyword.
pub struct TrendsScraper {
    client: reqwest::Client,
    base_url: String,
    keywords: Vec<String>,
    timeframe: String,
    geo: String,
    batch_size: usize,
    batch_delay_ms: u64,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl TrendsScraper {
    /// Create a scraper from app config plus the keywords to track.
    ///
    /// `timeframe` and `geo` follow the upstream API's conventions
    /// (e.g. `"today 3-m"`, `"US"`; empty geo means worldwide).
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        config: &insight_core::AppConfig,
        keywords: Vec<String>,
        timeframe: &str,
        geo: &str,
    ) -> Result<Self, ScrapeError> {
        Self::with_base_url(config, keywords, timeframe, geo, DEFAULT_BASE_URL)
    }

    /// Create a scraper with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Same as [`TrendsScraper::new`].
    pub fn with_base_url(
        config: &insight_core::AppConfig,
        keywords: Vec<String>,
        timeframe: &str,
        geo: &str,
        base_url: &str,
    ) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(config.http_user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            keywords,
            timeframe: timeframe.to_owned(),
            geo: geo.to_owned(),
            batch_size: config.trends_batch_size.max(1),
            batch_delay_ms: config.trends_batch_delay_ms,
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_backoff_base_ms,
        })
    }

    /// Fetch one batch of keywords and return `(keyword, series)` pairs.
    async fn fetch_batch(&self, batch: &[String]) -> Result<Vec<(String, Vec<f64>)>, ScrapeError> {
        let req = serde_json::json!({
            "keywords": batch,
            "timeframe": self.timeframe,
            "geo": self.geo,
        })
        .to_string();
        let url = format!(
            "{}/api/widgetdata/multiline?req={}",
            self.base_url,
            utf8_percent_encode(&req, NON_ALPHANUMERIC)
        );

        let response: InterestResponse =
            retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
                let url = url.clone();
                async move {
                    let response = self.client.get(&url).send().await?;
                    let status = response.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after_secs = response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(60);
                        return Err(ScrapeError::RateLimited {
                            source_name: "google_trends".to_owned(),
                            retry_after_secs,
                        });
                    }
                    if !status.is_success() {
                        return Err(ScrapeError::UnexpectedStatus {
                            status: status.as_u16(),
                            url,
                        });
                    }

                    let body = response.text().await?;
                    serde_json::from_str(&body).map_err(|e| ScrapeError::Deserialize {
                        context: format!("trends interest for {} keywords", batch.len()),
                        source: e,
                    })
                }
            })
            .await?;

        let series = transpose_series(batch, &response.default.timeline_data);
        Ok(series)
    }
}

/// Split the per-point value arrays into one series per keyword.
///
/// Points whose value array is shorter than the keyword index are skipped
/// for that keyword rather than failing the whole batch.
fn transpose_series(keywords: &[String], points: &[TimelinePoint]) -> Vec<(String, Vec<f64>)> {
    keywords
        .iter()
        .enumerate()
        .map(|(i, keyword)| {
            let series: Vec<f64> = points.iter().filter_map(|p| p.value.get(i).copied()).collect();
            (keyword.clone(), series)
        })
        .collect()
}

#[async_trait]
impl SignalScraper for TrendsScraper {
    fn source_name(&self) -> &'static str {
        "google_trends"
    }

    async fn scrape(&self) -> Vec<ScrapeResult> {
        let mut results = Vec::new();
        let batches: Vec<&[String]> = self.keywords.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            match self.fetch_batch(batch).await {
                Ok(series) => {
                    for (keyword, values) in series {
                        match self.to_result(&keyword, &values) {
                            Ok(result) => results.push(result),
                            Err(e) => {
                                tracing::debug!(keyword = %keyword, error = %e, "skipping keyword");
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        batch = index,
                        keywords = batch.len(),
                        error = %e,
                        "trends batch failed — continuing with remaining batches"
                    );
                }
            }

            if index + 1 < batch_count && self.batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.batch_delay_ms)).await;
            }
        }

        if results.is_empty() && !self.keywords.is_empty() {
            tracing::error!("trends scrape produced no results");
        }
        results
    }
}

impl TrendsScraper {
    fn to_result(&self, keyword: &str, series: &[f64]) -> Result<ScrapeResult, ScrapeError> {
        #[allow(clippy::cast_precision_loss)]
        let mean = if series.is_empty() {
            0.0
        } else {
            series.iter().sum::<f64>() / series.len() as f64
        };
        let latest = series.last().copied().unwrap_or(0.0);

        let url = format!(
            "https://trends.google.com/trends/explore?q={}&geo={}",
            utf8_percent_encode(keyword, NON_ALPHANUMERIC),
            self.geo
        );
        let title = format!("Search trend: {keyword}");
        let body = format!(
            "Relative search interest over {} ({} points, 0-100 scale): mean {mean:.1}, latest {latest:.1}.",
            self.timeframe,
            series.len()
        );
        let content = format_signal(
            &title,
            &[
                ("Source", "google_trends".to_owned()),
                ("Keyword", keyword.to_owned()),
                ("Timeframe", self.timeframe.clone()),
                ("Geo", if self.geo.is_empty() { "worldwide".to_owned() } else { self.geo.clone() }),
                ("Mean interest", format!("{mean:.1}")),
                ("Latest interest", format!("{latest:.1}")),
            ],
            &body,
        );

        ScrapeResult::new(
            url,
            title,
            content,
            SourceMetadata::GoogleTrends {
                keyword: keyword.to_owned(),
                timeframe: self.timeframe.clone(),
                geo: self.geo.clone(),
                mean_interest: mean,
                latest_interest: latest,
                extra: std::collections::BTreeMap::new(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(rows: &[&[f64]]) -> Vec<TimelinePoint> {
        rows.iter()
            .map(|row| TimelinePoint {
                value: row.to_vec(),
            })
            .collect()
    }

    #[test]
    fn transpose_splits_per_keyword() {
        let keywords = vec!["a".to_owned(), "b".to_owned()];
        let series = transpose_series(&keywords, &points(&[&[1.0, 10.0], &[2.0, 20.0]]));
        assert_eq!(series[0], ("a".to_owned(), vec![1.0, 2.0]));
        assert_eq!(series[1], ("b".to_owned(), vec![10.0, 20.0]));
    }

    #[test]
    fn transpose_skips_short_rows() {
        let keywords = vec!["a".to_owned(), "b".to_owned()];
        let series = transpose_series(&keywords, &points(&[&[1.0], &[2.0, 20.0]]));
        assert_eq!(series[1], ("b".to_owned(), vec![20.0]));
    }
}
