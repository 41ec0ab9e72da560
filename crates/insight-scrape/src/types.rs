use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

/// The uniform output of every scraper.
///
/// Constructed once per scraped item and handed to the persistence layer;
/// immutable afterward. `content` is guaranteed non-empty and already
/// normalized by [`crate::normalize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    /// Absolute URL of the scraped item.
    pub url: String,
    pub title: String,
    /// Normalized markdown text block.
    pub content: String,
    pub metadata: SourceMetadata,
}

impl ScrapeResult {
    /// Build a result, enforcing the non-empty-content invariant.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::EmptyContent`] if `content` is empty or
    /// whitespace-only.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        metadata: SourceMetadata,
    ) -> Result<Self, ScrapeError> {
        let url = url.into();
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ScrapeError::EmptyContent { url });
        }
        Ok(Self {
            url,
            title: title.into(),
            content,
            metadata,
        })
    }

    #[must_use]
    pub fn source_name(&self) -> &'static str {
        self.metadata.source_name()
    }
}

/// Source-specific metadata carried alongside every scraped item.
///
/// Known per-source fields are typed; `extra` holds genuinely
/// source-specific leftovers as a string map. The expected keys per source
/// are part of each scraper's contract, not an open bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceMetadata {
    Reddit {
        subreddit: String,
        post_id: String,
        score: i64,
        num_comments: i64,
        created_utc: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, String>,
    },
    HackerNews {
        object_id: String,
        points: i64,
        num_comments: i64,
        author: String,
        created_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, String>,
    },
    GoogleTrends {
        keyword: String,
        timeframe: String,
        geo: String,
        mean_interest: f64,
        latest_interest: f64,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, String>,
    },
    Web {
        /// SHA-256 of the cleaned page content, hex-encoded.
        fingerprint: String,
        fetched_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, String>,
    },
}

impl SourceMetadata {
    #[must_use]
    pub fn source_name(&self) -> &'static str {
        match self {
            SourceMetadata::Reddit { .. } => "reddit",
            SourceMetadata::HackerNews { .. } => "hacker_news",
            SourceMetadata::GoogleTrends { .. } => "google_trends",
            SourceMetadata::Web { .. } => "web",
        }
    }
}
