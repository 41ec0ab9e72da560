//! Source scrapers for the StartInsight ingestion pipeline.
//!
//! Each scraper fetches raw content from one external source (Reddit,
//! Hacker News, Google Trends style APIs, competitor web pages) and
//! normalizes it into a uniform [`ScrapeResult`] so the downstream LLM
//! analysis step receives homogeneous markdown input regardless of source.

pub mod error;
pub mod normalize;
pub mod retry;
pub mod sources;
pub mod types;

pub use error::ScrapeError;
pub use sources::hackernews::HackerNewsScraper;
pub use sources::reddit::RedditScraper;
pub use sources::trends::TrendsScraper;
pub use sources::web::WebScraper;
pub use sources::{collect_all, SignalScraper};
pub use types::{ScrapeResult, SourceMetadata};
