//! Trend-keyword verification against a Google-Trends-style API.
//!
//! The LLM asserts search volume and growth for keywords; this module
//! fetches the real relative-interest series, computes volume and growth
//! from it, and replaces the claimed strings with verified formatted
//! values. The upstream API is rate limited per caller, so the production
//! client spaces consecutive requests by a minimum interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;

use crate::cache::ValidationCache;
use crate::error::VerifyError;
use crate::retry::retry_with_backoff;
use crate::types::{TrendClaim, TrendVerification, VerifiedTrendClaim};

const DEFAULT_BASE_URL: &str = "https://trends.google.com/trends";

/// Default tolerance for [`compare_growth_claims`], in percent of the
/// actual value.
pub const DEFAULT_GROWTH_TOLERANCE_PERCENT: f64 = 50.0;

/// Capability interface for relative-interest lookups.
#[async_trait]
pub trait TrendLookup: Send + Sync {
    /// Fetch the 0-100 relative-interest series for one keyword.
    async fn interest_over_time(
        &self,
        keyword: &str,
        timeframe: &str,
        geo: &str,
    ) -> Result<Vec<f64>, VerifyError>;
}

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
    value: Vec<f64>,
}

/// Production trends client with per-caller request spacing.
pub struct GoogleTrendsClient {
    client: reqwest::Client,
    base_url: String,
    min_interval: Duration,
    /// Held across the pre-request sleep so calls are spaced globally.
    last_request: tokio::sync::Mutex<Option<Instant>>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl GoogleTrendsClient {
    /// Create a client from app config.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: &insight_core::AppConfig) -> Result<Self, VerifyError> {
        Self::with_base_url(config, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Same as [`GoogleTrendsClient::new`].
    pub fn with_base_url(
        config: &insight_core::AppConfig,
        base_url: &str,
    ) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(config.http_user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            min_interval: Duration::from_millis(config.trends_min_interval_ms),
            last_request: tokio::sync::Mutex::new(None),
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_backoff_base_ms,
        })
    }

    /// Sleep out the remainder of the minimum inter-request interval.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_series(
        &self,
        keyword: &str,
        timeframe: &str,
        geo: &str,
    ) -> Result<Vec<f64>, VerifyError> {
        self.pace().await;

        let req = serde_json::json!({
            "keywords": [keyword],
            "timeframe": timeframe,
            "geo": geo,
        })
        .to_string();
        let url = format!(
            "{}/api/widgetdata/multiline?req={}",
            self.base_url,
            utf8_percent_encode(&req, NON_ALPHANUMERIC)
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(VerifyError::RateLimited { retry_after_secs });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(VerifyError::NotFound {
                subject: keyword.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(VerifyError::Upstream {
                subject: keyword.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let parsed: InterestResponse =
            serde_json::from_str(&body).map_err(|e| VerifyError::Deserialize {
                context: format!("interest series for \"{keyword}\""),
                source: e,
            })?;

        Ok(parsed
            .default
            .timeline_data
            .iter()
            .filter_map(|p| p.value.first().copied())
            .collect())
    }
}

#[async_trait]
impl TrendLookup for GoogleTrendsClient {
    async fn interest_over_time(
        &self,
        keyword: &str,
        timeframe: &str,
        geo: &str,
    ) -> Result<Vec<f64>, VerifyError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.fetch_series(keyword, timeframe, geo)
        })
        .await
    }
}

/// Coarse volume bucket on the 0-100 relative-interest scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeBucket {
    High,
    Medium,
    Low,
    VeryLow,
}

impl VolumeBucket {
    #[must_use]
    pub fn from_interest(mean: f64) -> Self {
        if mean >= 70.0 {
            VolumeBucket::High
        } else if mean >= 40.0 {
            VolumeBucket::Medium
        } else if mean >= 15.0 {
            VolumeBucket::Low
        } else {
            VolumeBucket::VeryLow
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VolumeBucket::High => "High",
            VolumeBucket::Medium => "Medium",
            VolumeBucket::Low => "Low",
            VolumeBucket::VeryLow => "Very Low",
        }
    }
}

/// Verifies trend claims, caching by keyword/timeframe/geo.
pub struct TrendVerifier {
    lookup: Arc<dyn TrendLookup>,
    cache: ValidationCache<TrendVerification>,
}

impl TrendVerifier {
    #[must_use]
    pub fn new(lookup: Arc<dyn TrendLookup>) -> Self {
        Self {
            lookup,
            cache: ValidationCache::new(),
        }
    }

    /// Fetch the real interest series and derive volume and growth.
    ///
    /// Never raises: API failures come back as `verified == false` with a
    /// typed reason string. Results are cached for the process lifetime.
    pub async fn verify(&self, keyword: &str, timeframe: &str, geo: &str) -> TrendVerification {
        let subject = keyword.trim().to_lowercase();
        let key = format!("{subject}|{timeframe}|{geo}");
        let lookup = Arc::clone(&self.lookup);
        let timeframe = timeframe.to_owned();
        let geo = geo.to_owned();

        self.cache
            .get_or_fetch(&key, || async move {
                match lookup.interest_over_time(&subject, &timeframe, &geo).await {
                    Ok(series) => {
                        let volume = mean(&series);
                        let growth = growth_percent(&series);
                        tracing::debug!(
                            keyword = %subject,
                            points = series.len(),
                            volume,
                            growth,
                            "trend verified"
                        );
                        TrendVerification {
                            subject,
                            verified: true,
                            actual_volume: Some(volume),
                            actual_growth_percent: growth,
                            claimed_volume: None,
                            claimed_growth: None,
                            error: None,
                        }
                    }
                    Err(e) => {
                        tracing::debug!(keyword = %subject, error = %e, "trend verification failed");
                        TrendVerification {
                            subject,
                            verified: false,
                            actual_volume: None,
                            actual_growth_percent: None,
                            claimed_volume: None,
                            claimed_growth: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .await
    }

    /// Verify a batch of claims, replacing claimed volume/growth strings
    /// with verified formatted values on success. Failed keywords keep
    /// their verification record (with the reason) so callers can flag
    /// them; their claimed strings are cleared rather than left as
    /// unverified LLM output.
    pub async fn verify_all(
        &self,
        claims: Vec<TrendClaim>,
        timeframe: &str,
        geo: &str,
    ) -> Vec<VerifiedTrendClaim> {
        let mut out = Vec::with_capacity(claims.len());
        for mut claim in claims {
            let mut verification = self.verify(&claim.keyword, timeframe, geo).await;
            verification.claimed_volume = claim.volume.clone();
            verification.claimed_growth = claim.growth.clone();

            if verification.verified {
                let volume = verification.actual_volume.unwrap_or(0.0);
                claim.volume = Some(VolumeBucket::from_interest(volume).as_str().to_owned());
                claim.growth = Some(format_growth(verification.actual_growth_percent));
            } else {
                claim.volume = None;
                claim.growth = None;
            }
            out.push(VerifiedTrendClaim {
                claim,
                verification,
            });
        }
        out
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn mean(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let len = series.len() as f64;
    series.iter().sum::<f64>() / len
}

/// Growth from the first half of the series to the second half.
///
/// Short series (< 4 points) compare first vs last point. Returns `None`
/// when the series is empty or the baseline is zero.
fn growth_percent(series: &[f64]) -> Option<f64> {
    if series.is_empty() {
        return None;
    }
    let (baseline, current) = if series.len() < 4 {
        (*series.first()?, *series.last()?)
    } else {
        let mid = series.len() / 2;
        (mean(&series[..mid]), mean(&series[mid..]))
    };
    if baseline <= 0.0 {
        return None;
    }
    Some((current - baseline) / baseline * 100.0)
}

/// Render a growth percentage as a signed display string, `"N/A"` when
/// undeterminable.
#[must_use]
pub fn format_growth(percent: Option<f64>) -> String {
    match percent {
        Some(p) => format!("{p:+.0}%"),
        None => "N/A".to_owned(),
    }
}

/// Whether a claimed growth percentage is within `tolerance_percent` of the
/// actual computed one.
///
/// Tolerance is relative to the actual value: with the default 50 %, an
/// actual +200 % accepts claims between +100 % and +300 %. A zero actual
/// falls back to an absolute band of `tolerance_percent` points.
#[must_use]
pub fn compare_growth_claims(claimed: f64, actual: f64, tolerance_percent: f64) -> bool {
    if actual == 0.0 {
        return claimed.abs() <= tolerance_percent;
    }
    (claimed - actual).abs() <= actual.abs() * tolerance_percent / 100.0
}

/// Pull a numeric percentage out of an LLM-asserted growth string
/// (`"+500%"`, `"about 45 %"`). Returns `None` for non-numeric claims.
#[must_use]
pub fn parse_percent(claim: &str) -> Option<f64> {
    let cleaned: String = claim
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+')
        .collect();
    cleaned.trim_start_matches('+').parse::<f64>().ok()
}
