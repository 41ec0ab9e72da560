//! Reddit hot-post scraper (client-credentials OAuth).

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::normalize::format_signal;
use crate::retry::retry_with_backoff;
use crate::sources::SignalScraper;
use crate::types::{ScrapeResult, SourceMetadata};

const DEFAULT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_API_BASE_URL: &str = "https://oauth.reddit.com";
const SELFTEXT_SNIPPET_CHARS: usize = 1_500;

/// Reddit OAuth token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Reddit listing wrapper.
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    subreddit: String,
    title: String,
    #[serde(default)]
    selftext: String,
    permalink: String,
    score: i64,
    num_comments: i64,
    created_utc: f64,
    #[serde(default)]
    stickied: bool,
}

/// Scraper for hot posts across a configured list of subreddits.
///
/// Each `scrape` call exchanges client credentials for a fresh token, pulls
/// the hot listing per subreddit, filters by minimum score and maximum post
/// age, drops stickied posts, dedups by post id across subreddits, and
/// returns the union sorted by score descending.
pub struct RedditScraper {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    user_agent: String,
    subreddits: Vec<String>,
    min_score: i64,
    max_age_hours: i64,
    posts_per_subreddit: usize,
    max_retries: u32,
    backoff_base_ms: u64,
    token_url: String,
    api_base_url: String,
}

impl RedditScraper {
    /// Create a scraper from app config plus the subreddit list to watch.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::NotConfigured`] when Reddit credentials are
    /// absent from the config, and [`ScrapeError::Http`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn new(
        config: &insight_core::AppConfig,
        subreddits: Vec<String>,
    ) -> Result<Self, ScrapeError> {
        Self::with_base_urls(config, subreddits, DEFAULT_TOKEN_URL, DEFAULT_API_BASE_URL)
    }

    /// Create a scraper with custom token/API URLs (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Same as [`RedditScraper::new`].
    pub fn with_base_urls(
        config: &insight_core::AppConfig,
        subreddits: Vec<String>,
        token_url: &str,
        api_base_url: &str,
    ) -> Result<Self, ScrapeError> {
        let (Some(client_id), Some(client_secret)) = (
            config.reddit_client_id.clone(),
            config.reddit_client_secret.clone(),
        ) else {
            return Err(ScrapeError::NotConfigured {
                source_name: "reddit".to_owned(),
                reason: "REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET not set".to_owned(),
            });
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            user_agent: config.reddit_user_agent.clone(),
            subreddits,
            min_score: config.reddit_min_score,
            max_age_hours: config.reddit_max_age_hours,
            posts_per_subreddit: config.reddit_posts_per_subreddit,
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_backoff_base_ms,
            token_url: token_url.trim_end_matches('/').to_owned(),
            api_base_url: api_base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn fetch_token(&self) -> Result<String, ScrapeError> {
        let response = self
            .client
            .post(&self.token_url)
            .header("User-Agent", &self.user_agent)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.token_url.clone(),
            });
        }

        let body = response.text().await?;
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ScrapeError::Deserialize {
                context: "reddit token exchange".to_owned(),
                source: e,
            })?;
        Ok(token.access_token)
    }

    /// Fetch and filter the hot listing for one subreddit.
    async fn fetch_subreddit(
        &self,
        token: &str,
        subreddit: &str,
    ) -> Result<Vec<ScrapeResult>, ScrapeError> {
        let url = format!("{}/r/{subreddit}/hot", self.api_base_url);
        let limit = self.posts_per_subreddit.to_string();

        let listing: Listing = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let url = url.clone();
            let limit = limit.clone();
            async move {
                let response = self
                    .client
                    .get(&url)
                    .header("Authorization", format!("Bearer {token}"))
                    .header("User-Agent", &self.user_agent)
                    .query(&[("limit", limit.as_str()), ("raw_json", "1")])
                    .send()
                    .await?;

                let status = response.status();
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);
                    return Err(ScrapeError::RateLimited {
                        source_name: "reddit".to_owned(),
                        retry_after_secs,
                    });
                }
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(ScrapeError::NotFound { url });
                }
                if !status.is_success() {
                    return Err(ScrapeError::UnexpectedStatus {
                        status: status.as_u16(),
                        url,
                    });
                }

                let body = response.text().await?;
                serde_json::from_str(&body).map_err(|e| ScrapeError::Deserialize {
                    context: format!("hot listing for r/{subreddit}"),
                    source: e,
                })
            }
        })
        .await?;

        let cutoff = Utc::now() - chrono::Duration::hours(self.max_age_hours);
        let results = listing
            .data
            .children
            .into_iter()
            .map(|post| post.data)
            .filter(|post| {
                !post.stickied && post.score >= self.min_score && post_created_at(post) >= cutoff
            })
            .filter_map(|post| match to_result(&post) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::debug!(post_id = %post.id, error = %e, "skipping reddit post");
                    None
                }
            })
            .collect();
        Ok(results)
    }
}

#[async_trait]
impl SignalScraper for RedditScraper {
    fn source_name(&self) -> &'static str {
        "reddit"
    }

    async fn scrape(&self) -> Vec<ScrapeResult> {
        let token = match self.fetch_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "reddit token exchange failed — skipping run");
                return Vec::new();
            }
        };

        let mut results: Vec<ScrapeResult> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        for subreddit in &self.subreddits {
            match self.fetch_subreddit(&token, subreddit).await {
                Ok(batch) => {
                    tracing::debug!(
                        subreddit = %subreddit,
                        count = batch.len(),
                        "collected reddit posts"
                    );
                    for result in batch {
                        let SourceMetadata::Reddit { ref post_id, .. } = result.metadata else {
                            continue;
                        };
                        if seen_ids.insert(post_id.clone()) {
                            results.push(result);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        subreddit = %subreddit,
                        error = %e,
                        "subreddit fetch failed — continuing with remaining subreddits"
                    );
                }
            }
        }

        sort_by_score(&mut results);
        results
    }
}

fn sort_by_score(results: &mut [ScrapeResult]) {
    results.sort_by(|a, b| {
        let score = |r: &ScrapeResult| match &r.metadata {
            SourceMetadata::Reddit { score, .. } => *score,
            _ => 0,
        };
        score(b).cmp(&score(a)).then_with(|| a.url.cmp(&b.url))
    });
}

fn to_result(post: &PostData) -> Result<ScrapeResult, ScrapeError> {
    let url = format!("https://reddit.com{}", post.permalink);
    let snippet: String = post.selftext.chars().take(SELFTEXT_SNIPPET_CHARS).collect();
    let content = format_signal(
        &post.title,
        &[
            ("Source", "reddit".to_owned()),
            ("Subreddit", format!("r/{}", post.subreddit)),
            ("Score", post.score.to_string()),
            ("Comments", post.num_comments.to_string()),
        ],
        &snippet,
    );

    ScrapeResult::new(
        url,
        post.title.clone(),
        content,
        SourceMetadata::Reddit {
            subreddit: post.subreddit.clone(),
            post_id: post.id.clone(),
            score: post.score,
            num_comments: post.num_comments,
            created_utc: post_created_at(post),
            extra: std::collections::BTreeMap::new(),
        },
    )
}

/// Creation time from the epoch-seconds float Reddit returns.
///
/// Unparseable timestamps map to the epoch, which the age cutoff then
/// rejects.
fn post_created_at(post: &PostData) -> DateTime<Utc> {
    #[allow(clippy::cast_possible_truncation)]
    let secs = post.created_utc as i64;
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}
