//! Signal source adapters.

pub mod hackernews;
pub mod reddit;
pub mod trends;
pub mod web;

use async_trait::async_trait;

use crate::types::ScrapeResult;

/// One adapter per external source.
///
/// `scrape` re-fetches on every call and returns a finite batch. It never
/// fails the whole run: per-sub-fetch failures (one subreddit, one keyword
/// batch) are logged and skipped, and a systemic failure yields an empty
/// vec after an error-level log.
#[async_trait]
pub trait SignalScraper: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn scrape(&self) -> Vec<ScrapeResult>;
}

/// Run every scraper and concatenate the results.
///
/// Scrapers run concurrently; ordering across sources is unspecified.
/// Within one source the adapter's own ranking order is preserved.
pub async fn collect_all(scrapers: &[std::sync::Arc<dyn SignalScraper>]) -> Vec<ScrapeResult> {
    let batches = futures::future::join_all(
        scrapers
            .iter()
            .map(|s| async { (s.source_name(), s.scrape().await) }),
    )
    .await;

    let mut all = Vec::new();
    for (source, batch) in batches {
        tracing::info!(source, count = batch.len(), "scraper finished");
        all.extend(batch);
    }
    all
}
