//! Windowed quality metrics over the persisted signal/insight store.
//!
//! The collector reads aggregate counts from the store through the
//! [`SignalStore`] seam and folds in process-local validation and error
//! history. Every rate in a snapshot is computed from counts in that same
//! snapshot; zero denominators yield `0.0`, never an error.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QualityError;

/// Most recent validation results kept for rate computation.
const VALIDATION_HISTORY_CAP: usize = 1_000;
/// Most recent component errors kept for rate computation.
const ERROR_HISTORY_CAP: usize = 1_000;

/// Signal-side aggregate counts for one `[start, end)` window.
#[derive(Debug, Clone, Default)]
pub struct SignalCounts {
    pub total: u64,
    pub by_source: BTreeMap<String, u64>,
    pub duplicates: u64,
    /// Signals collected but not yet analyzed.
    pub pending_processing: u64,
}

/// Dimension scores for one insight; `None` marks a dimension the LLM left
/// unscored.
pub type InsightDimensions = BTreeMap<String, Option<f64>>;

/// Aggregate read interface over the persisted signal/insight store.
///
/// Implementations are external (SQL, in-memory, fixtures); the collector
/// only needs these two queries.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn signal_counts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SignalCounts, QualityError>;

    /// Per-insight dimension scores for insights created in the window.
    async fn insight_dimensions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InsightDimensions>, QualityError>;
}

/// A point-in-time snapshot of pipeline quality over `[period_start,
/// period_end)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,

    pub total_signals_collected: u64,
    pub signals_by_source: BTreeMap<String, u64>,
    pub duplicate_count: u64,
    pub duplicate_rate: f64,

    pub total_insights_generated: u64,

    pub validation_pass_count: u64,
    pub validation_fail_count: u64,
    pub validation_pass_rate: f64,

    pub llm_error_count: u64,
    pub llm_error_rate: f64,

    pub processing_backlog: u64,
    pub backlog_ratio: f64,

    /// Mean per dimension over non-null scores only.
    pub dimension_averages: BTreeMap<String, f64>,
    /// Per dimension, counts of insights per integer score bucket ("0".."10").
    pub score_distribution: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Weights for the composite quality score, normalized by their sum.
#[derive(Debug, Clone, Copy)]
pub struct QualityWeights {
    pub validation_pass: f64,
    pub inverse_duplicate: f64,
    pub relevance: f64,
    pub inverse_error: f64,
    pub inverse_backlog: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            validation_pass: 0.30,
            inverse_duplicate: 0.20,
            relevance: 0.20,
            inverse_error: 0.20,
            inverse_backlog: 0.10,
        }
    }
}

#[derive(Debug, Clone)]
struct ValidationRecord {
    passed: bool,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ErrorRecord {
    component: String,
    at: DateTime<Utc>,
}

/// Computes [`QualityMetrics`] snapshots on demand.
///
/// Validation results and component errors are recorded into capped
/// process-local histories; the store provides everything else.
pub struct MetricsCollector {
    store: Arc<dyn SignalStore>,
    weights: QualityWeights,
    validation_history: Mutex<VecDeque<ValidationRecord>>,
    error_history: Mutex<VecDeque<ErrorRecord>>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new(store: Arc<dyn SignalStore>) -> Self {
        Self::with_weights(store, QualityWeights::default())
    }

    #[must_use]
    pub fn with_weights(store: Arc<dyn SignalStore>, weights: QualityWeights) -> Self {
        Self {
            store,
            weights,
            validation_history: Mutex::new(VecDeque::new()),
            error_history: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one validation outcome (community, trend, or URL check).
    pub fn record_validation_result(&self, kind: &str, subject: &str, passed: bool) {
        tracing::debug!(kind, subject, passed, "validation result recorded");
        let mut history = self
            .validation_history
            .lock()
            .expect("validation history lock poisoned");
        if history.len() == VALIDATION_HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(ValidationRecord {
            passed,
            at: Utc::now(),
        });
    }

    /// Record a component failure (e.g. `("llm", "parse_error")`).
    pub fn record_error(&self, component: &str, error_type: &str) {
        tracing::debug!(component, error_type, "component error recorded");
        let mut history = self
            .error_history
            .lock()
            .expect("error history lock poisoned");
        if history.len() == ERROR_HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(ErrorRecord {
            component: component.to_owned(),
            at: Utc::now(),
        });
    }

    /// Collect metrics for the last 24 hours ending now.
    ///
    /// # Errors
    ///
    /// Returns [`QualityError::Store`] when the backing store fails.
    pub async fn collect(&self) -> Result<QualityMetrics, QualityError> {
        let end = Utc::now();
        self.collect_window(end - Duration::hours(24), end).await
    }

    /// Collect metrics for an explicit `[start, end)` window.
    ///
    /// A window with zero signals or insights produces all-zero rates.
    ///
    /// # Errors
    ///
    /// Returns [`QualityError::Store`] when the backing store fails.
    pub async fn collect_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<QualityMetrics, QualityError> {
        let counts = self.store.signal_counts(start, end).await?;
        let insights = self.store.insight_dimensions(start, end).await?;

        let (validation_pass_count, validation_fail_count) = {
            let history = self
                .validation_history
                .lock()
                .expect("validation history lock poisoned");
            let in_window = history.iter().filter(|r| r.at >= start && r.at < end);
            in_window.fold((0u64, 0u64), |(pass, fail), r| {
                if r.passed {
                    (pass + 1, fail)
                } else {
                    (pass, fail + 1)
                }
            })
        };

        let llm_error_count = {
            let history = self.error_history.lock().expect("error history lock poisoned");
            history
                .iter()
                .filter(|r| r.component == "llm" && r.at >= start && r.at < end)
                .count() as u64
        };

        let total_insights = insights.len() as u64;
        let (dimension_averages, score_distribution) = summarize_dimensions(&insights);

        Ok(QualityMetrics {
            period_start: start,
            period_end: end,
            total_signals_collected: counts.total,
            signals_by_source: counts.by_source,
            duplicate_count: counts.duplicates,
            duplicate_rate: ratio(counts.duplicates, counts.total),
            total_insights_generated: total_insights,
            validation_pass_count,
            validation_fail_count,
            validation_pass_rate: ratio(
                validation_pass_count,
                validation_pass_count + validation_fail_count,
            ),
            llm_error_count,
            llm_error_rate: ratio(llm_error_count, total_insights + llm_error_count),
            processing_backlog: counts.pending_processing,
            backlog_ratio: ratio(counts.pending_processing, counts.total),
            dimension_averages,
            score_distribution,
        })
    }

    /// Composite 0-100 quality score for a snapshot.
    ///
    /// Weighted blend of validation pass rate, inverse duplicate rate,
    /// average relevance (0-10 scale), inverse LLM error rate, and inverse
    /// backlog ratio, using this collector's [`QualityWeights`].
    #[must_use]
    pub fn quality_score(&self, metrics: &QualityMetrics) -> f64 {
        let w = &self.weights;
        let weight_sum = w.validation_pass
            + w.inverse_duplicate
            + w.relevance
            + w.inverse_error
            + w.inverse_backlog;
        if weight_sum <= 0.0 {
            return 0.0;
        }

        let relevance = metrics
            .dimension_averages
            .get("relevance")
            .map_or(0.0, |avg| (avg / 10.0).clamp(0.0, 1.0));

        let blended = w.validation_pass * metrics.validation_pass_rate
            + w.inverse_duplicate * (1.0 - metrics.duplicate_rate)
            + w.relevance * relevance
            + w.inverse_error * (1.0 - metrics.llm_error_rate)
            + w.inverse_backlog * (1.0 - metrics.backlog_ratio);

        (blended / weight_sum * 100.0).clamp(0.0, 100.0)
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Per-dimension averages and integer-bucket distributions, ignoring null
/// scores in both the denominator and the bucket counts.
fn summarize_dimensions(
    insights: &[InsightDimensions],
) -> (BTreeMap<String, f64>, BTreeMap<String, BTreeMap<String, u64>>) {
    let mut sums: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    let mut distribution: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();

    for insight in insights {
        for (dimension, value) in insight {
            let Some(value) = value else { continue };
            let entry = sums.entry(dimension.clone()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bucket = value.clamp(0.0, 10.0).floor() as u64;
            *distribution
                .entry(dimension.clone())
                .or_default()
                .entry(bucket.to_string())
                .or_insert(0) += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let averages = sums
        .into_iter()
        .map(|(dimension, (sum, count))| (dimension, sum / count as f64))
        .collect();
    (averages, distribution)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory store over timestamped signal/insight fixtures.
    struct FakeStore {
        signals: Vec<(DateTime<Utc>, &'static str, bool, bool)>,
        insights: Vec<(DateTime<Utc>, InsightDimensions)>,
    }

    #[async_trait]
    impl SignalStore for FakeStore {
        async fn signal_counts(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<SignalCounts, QualityError> {
            let mut counts = SignalCounts::default();
            for (at, source, duplicate, pending) in &self.signals {
                if *at < start || *at >= end {
                    continue;
                }
                counts.total += 1;
                *counts.by_source.entry((*source).to_owned()).or_insert(0) += 1;
                if *duplicate {
                    counts.duplicates += 1;
                }
                if *pending {
                    counts.pending_processing += 1;
                }
            }
            Ok(counts)
        }

        async fn insight_dimensions(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<InsightDimensions>, QualityError> {
            Ok(self
                .insights
                .iter()
                .filter(|(at, _)| *at >= start && *at < end)
                .map(|(_, dims)| dims.clone())
                .collect())
        }
    }

    fn at(hours_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::hours(hours_ago)
    }

    fn dims(pairs: &[(&str, Option<f64>)]) -> InsightDimensions {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), *v))
            .collect()
    }

    fn store_with_mixed_signals() -> Arc<FakeStore> {
        let mut signals = Vec::new();
        for i in 0..60 {
            signals.push((at(1), "reddit", i < 6, false));
        }
        for i in 0..40 {
            signals.push((at(2), "hacker_news", i < 4, false));
        }
        Arc::new(FakeStore {
            signals,
            insights: vec![
                (at(1), dims(&[("relevance", Some(8.0)), ("opportunity", Some(6.0))])),
                (at(1), dims(&[("relevance", Some(6.0)), ("opportunity", None)])),
                (at(2), dims(&[("relevance", None), ("opportunity", Some(9.0))])),
            ],
        })
    }

    #[tokio::test]
    async fn collect_computes_counts_and_rates_from_one_window() {
        let collector = MetricsCollector::new(store_with_mixed_signals());
        let metrics = collector
            .collect_window(at(24), Utc::now())
            .await
            .unwrap();

        assert_eq!(metrics.total_signals_collected, 100);
        assert_eq!(metrics.signals_by_source.get("reddit"), Some(&60));
        assert_eq!(metrics.signals_by_source.get("hacker_news"), Some(&40));
        assert_eq!(metrics.duplicate_count, 10);
        assert!((metrics.duplicate_rate - 0.10).abs() < 1e-9);
        assert_eq!(metrics.total_insights_generated, 3);
    }

    #[tokio::test]
    async fn dimension_stats_ignore_null_scores() {
        let collector = MetricsCollector::new(store_with_mixed_signals());
        let metrics = collector
            .collect_window(at(24), Utc::now())
            .await
            .unwrap();

        // relevance: (8 + 6) / 2 non-null values.
        assert!((metrics.dimension_averages["relevance"] - 7.0).abs() < 1e-9);
        // opportunity: (6 + 9) / 2 non-null values.
        assert!((metrics.dimension_averages["opportunity"] - 7.5).abs() < 1e-9);

        let relevance_buckets = &metrics.score_distribution["relevance"];
        assert_eq!(relevance_buckets.get("8"), Some(&1));
        assert_eq!(relevance_buckets.get("6"), Some(&1));
        assert_eq!(relevance_buckets.values().sum::<u64>(), 2, "nulls not bucketed");
    }

    #[tokio::test]
    async fn empty_window_produces_zero_rates_not_errors() {
        let collector = MetricsCollector::new(Arc::new(FakeStore {
            signals: Vec::new(),
            insights: Vec::new(),
        }));
        let metrics = collector
            .collect_window(at(24), Utc::now())
            .await
            .unwrap();

        assert_eq!(metrics.total_signals_collected, 0);
        assert_eq!(metrics.duplicate_rate, 0.0);
        assert_eq!(metrics.validation_pass_rate, 0.0);
        assert_eq!(metrics.llm_error_rate, 0.0);
        assert_eq!(metrics.backlog_ratio, 0.0);
        assert!(metrics.dimension_averages.is_empty());
    }

    #[tokio::test]
    async fn narrower_windows_never_count_more_signals() {
        let collector = MetricsCollector::new(store_with_mixed_signals());
        let narrow = collector
            .collect_window(at(1) - Duration::minutes(30), Utc::now())
            .await
            .unwrap();
        let wide = collector
            .collect_window(at(24), Utc::now())
            .await
            .unwrap();
        assert!(narrow.total_signals_collected <= wide.total_signals_collected);
    }

    #[tokio::test]
    async fn validation_history_feeds_pass_rate_and_is_capped() {
        let collector = MetricsCollector::new(Arc::new(FakeStore {
            signals: Vec::new(),
            insights: Vec::new(),
        }));

        for i in 0..1_100 {
            collector.record_validation_result("community", "r/startups", i % 4 != 0);
        }
        let metrics = collector
            .collect_window(at(1), Utc::now())
            .await
            .unwrap();

        assert_eq!(
            metrics.validation_pass_count + metrics.validation_fail_count,
            1_000,
            "history is capped at the most recent 1000 entries"
        );
        assert!(metrics.validation_pass_rate > 0.70);
    }

    #[tokio::test]
    async fn llm_errors_count_against_insights() {
        let store = Arc::new(FakeStore {
            signals: Vec::new(),
            insights: vec![(at(1), dims(&[("relevance", Some(5.0))]))],
        });
        let collector = MetricsCollector::new(store);
        collector.record_error("llm", "parse_error");
        collector.record_error("scraper", "timeout");

        let metrics = collector
            .collect_window(at(24), Utc::now())
            .await
            .unwrap();
        assert_eq!(metrics.llm_error_count, 1, "only llm component errors count");
        assert!((metrics.llm_error_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn quality_score_blends_with_default_weights() {
        let collector = MetricsCollector::new(Arc::new(FakeStore {
            signals: Vec::new(),
            insights: Vec::new(),
        }));
        let mut metrics = collector
            .collect_window(at(1), Utc::now())
            .await
            .unwrap();
        metrics.validation_pass_rate = 1.0;
        metrics.duplicate_rate = 0.0;
        metrics.llm_error_rate = 0.0;
        metrics.backlog_ratio = 0.0;
        metrics
            .dimension_averages
            .insert("relevance".to_owned(), 10.0);

        let score = collector.quality_score(&metrics);
        assert!((score - 100.0).abs() < 1e-9, "perfect inputs score 100, got {score}");

        metrics.validation_pass_rate = 0.5;
        let score = collector.quality_score(&metrics);
        // Losing half the 30 % pass-rate weight costs 15 points.
        assert!((score - 85.0).abs() < 1e-9, "got {score}");
    }
}
