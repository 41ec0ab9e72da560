//! Hacker News scraper over the Algolia search API.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::normalize::format_signal;
use crate::retry::retry_with_backoff;
use crate::sources::SignalScraper;
use crate::types::{ScrapeResult, SourceMetadata};

const DEFAULT_BASE_URL: &str = "https://hn.algolia.com/api/v1";
const PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    points: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    author: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    story_text: Option<String>,
}

/// Scraper for Hacker News stories matching configured keywords.
///
/// For each keyword it runs a plain story search and a `Show HN` search,
/// dedups the union by Algolia `objectID`, filters by minimum points, and
/// returns the remainder sorted by points descending, capped at
/// `max_results`.
pub struct HackerNewsScraper {
    client: reqwest::Client,
    base_url: String,
    keywords: Vec<String>,
    max_results: usize,
    min_points: i64,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl HackerNewsScraper {
    /// Create a scraper from app config plus the keyword list to search.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        config: &insight_core::AppConfig,
        keywords: Vec<String>,
    ) -> Result<Self, ScrapeError> {
        Self::with_base_url(config, keywords, DEFAULT_BASE_URL)
    }

    /// Create a scraper with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Same as [`HackerNewsScraper::new`].
    pub fn with_base_url(
        config: &insight_core::AppConfig,
        keywords: Vec<String>,
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
            max_results: config.hn_max_results,
            min_points: config.hn_min_points,
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_backoff_base_ms,
        })
    }

    async fn search(&self, query: &str, tags: &str) -> Result<Vec<Hit>, ScrapeError> {
        let url = format!("{}/search", self.base_url);
        let page_size = PAGE_SIZE.to_string();

        let response: SearchResponse =
            retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
                let url = url.clone();
                let page_size = page_size.clone();
                async move {
                    let response = self
                        .client
                        .get(&url)
                        .query(&[
                            ("query", query),
                            ("tags", tags),
                            ("hitsPerPage", page_size.as_str()),
                        ])
                        .send()
                        .await?;

                    let status = response.status();
                    if !status.is_success() {
                        return Err(ScrapeError::UnexpectedStatus {
                            status: status.as_u16(),
                            url,
                        });
                    }

                    let body = response.text().await?;
                    serde_json::from_str(&body).map_err(|e| ScrapeError::Deserialize {
                        context: format!("hn search (query={query}, tags={tags})"),
                        source: e,
                    })
                }
            })
            .await?;

        Ok(response.hits)
    }
}

#[async_trait]
impl SignalScraper for HackerNewsScraper {
    fn source_name(&self) -> &'static str {
        "hacker_news"
    }

    async fn scrape(&self) -> Vec<ScrapeResult> {
        let mut hits: Vec<Hit> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut any_query_succeeded = false;

        // Plain story search plus Show HN per keyword: the result sets
        // overlap, so dedup by objectID as they arrive.
        for keyword in &self.keywords {
            for tags in ["story", "show_hn"] {
                match self.search(keyword, tags).await {
                    Ok(batch) => {
                        any_query_succeeded = true;
                        for hit in batch {
                            if seen_ids.insert(hit.object_id.clone()) {
                                hits.push(hit);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            keyword = %keyword,
                            tags,
                            error = %e,
                            "hn search failed — continuing with remaining queries"
                        );
                    }
                }
            }
        }

        if !any_query_succeeded && !self.keywords.is_empty() {
            tracing::error!("all hn searches failed — returning no results");
            return Vec::new();
        }

        hits.retain(|hit| hit.points.unwrap_or(0) >= self.min_points);
        hits.sort_by(|a, b| {
            b.points
                .unwrap_or(0)
                .cmp(&a.points.unwrap_or(0))
                .then_with(|| a.object_id.cmp(&b.object_id))
        });
        hits.truncate(self.max_results);

        hits.iter()
            .filter_map(|hit| match to_result(hit) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::debug!(object_id = %hit.object_id, error = %e, "skipping hn hit");
                    None
                }
            })
            .collect()
    }
}

fn to_result(hit: &Hit) -> Result<ScrapeResult, ScrapeError> {
    let title = hit.title.clone().unwrap_or_default();
    let points = hit.points.unwrap_or(0);
    let num_comments = hit.num_comments.unwrap_or(0);
    let author = hit.author.clone().unwrap_or_default();
    let item_url = format!("https://news.ycombinator.com/item?id={}", hit.object_id);
    let url = hit.url.clone().unwrap_or_else(|| item_url.clone());

    let content = format_signal(
        &title,
        &[
            ("Source", "hacker_news".to_owned()),
            ("Points", points.to_string()),
            ("Comments", num_comments.to_string()),
            ("Author", author.clone()),
            ("Discussion", item_url),
        ],
        hit.story_text.as_deref().unwrap_or(""),
    );

    ScrapeResult::new(
        url,
        title,
        content,
        SourceMetadata::HackerNews {
            object_id: hit.object_id.clone(),
            points,
            num_comments,
            author,
            created_at: hit.created_at.unwrap_or_default(),
            extra: std::collections::BTreeMap::new(),
        },
    )
}
