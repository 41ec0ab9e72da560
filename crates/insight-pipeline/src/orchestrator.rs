//! One end-to-end content cycle: find qualifying insights, then run
//! generation, review, and notification in order.
//!
//! Every stage is an external collaborator behind a trait. A stage failure
//! is caught and logged with its stage name; later stages still run, and
//! the run always ends with a recorded [`RunRecord`] whatever the outcome.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimal view of a scored insight the orchestrator needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightCandidate {
    pub id: String,
    pub title: String,
    pub score: f64,
}

/// Finds insights above the score threshold that moderation has not
/// rejected.
#[async_trait]
pub trait InsightFinder: Send + Sync {
    async fn find_qualifying(&self, min_score: f64) -> anyhow::Result<Vec<InsightCandidate>>;
}

/// Produces content artifacts for the given insights; returns how many
/// were generated.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, insights: &[InsightCandidate]) -> anyhow::Result<u32>;
}

/// Reviews generated content; returns how many pieces passed review.
#[async_trait]
pub trait QualityReviewer: Send + Sync {
    async fn review(&self, insights: &[InsightCandidate]) -> anyhow::Result<u32>;
}

/// Notifies subscribers; returns how many notifications were sent.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, insights: &[InsightCandidate]) -> anyhow::Result<u32>;
}

/// Durable sink for run records; the only side effect the orchestrator
/// produces directly.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn record(&self, record: &RunRecord) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Skipped,
    Completed,
    Partial,
    Failed,
}

/// Per-stage result: either a detail payload (counts) or an error string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: String,
    pub success: bool,
    pub detail: serde_json::Value,
}

impl StageOutcome {
    fn ok(stage: &str, detail: serde_json::Value) -> Self {
        Self {
            stage: stage.to_owned(),
            success: true,
            detail,
        }
    }

    fn err(stage: &str, error: &anyhow::Error) -> Self {
        tracing::error!(stage, error = %error, "pipeline stage failed — continuing");
        Self {
            stage: stage.to_owned(),
            success: false,
            detail: serde_json::json!({ "error": format!("{error:#}") }),
        }
    }
}

/// Observability record for one run, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub insights_processed: usize,
    pub stages_completed: usize,
    pub stages: Vec<StageOutcome>,
}

/// Drives one content cycle across the injected collaborators.
pub struct Orchestrator {
    enabled: bool,
    min_score: f64,
    finder: Arc<dyn InsightFinder>,
    generator: Arc<dyn ContentGenerator>,
    reviewer: Arc<dyn QualityReviewer>,
    notifier: Arc<dyn NotificationDispatcher>,
    recorder: Arc<dyn RunRecorder>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: &insight_core::AppConfig,
        finder: Arc<dyn InsightFinder>,
        generator: Arc<dyn ContentGenerator>,
        reviewer: Arc<dyn QualityReviewer>,
        notifier: Arc<dyn NotificationDispatcher>,
        recorder: Arc<dyn RunRecorder>,
    ) -> Self {
        Self {
            enabled: config.pipeline_enabled,
            min_score: config.pipeline_min_score,
            finder,
            generator,
            reviewer,
            notifier,
            recorder,
        }
    }

    /// Run one cycle and return its record.
    ///
    /// Never fails: stage errors end up inside the record, and the record
    /// itself is persisted best-effort.
    pub async fn run(&self) -> RunRecord {
        let started_at = Utc::now();

        if !self.enabled {
            tracing::info!("content pipeline disabled — skipping run");
            return self
                .finish(RunRecord {
                    status: RunStatus::Skipped,
                    started_at,
                    finished_at: Utc::now(),
                    insights_processed: 0,
                    stages_completed: 0,
                    stages: Vec::new(),
                })
                .await;
        }

        let mut stages: Vec<StageOutcome> = Vec::new();

        let insights = match self.finder.find_qualifying(self.min_score).await {
            Ok(insights) => {
                stages.push(StageOutcome::ok(
                    "find",
                    serde_json::json!({ "qualifying": insights.len() }),
                ));
                insights
            }
            Err(e) => {
                stages.push(StageOutcome::err("find", &e));
                return self
                    .finish(RunRecord {
                        status: RunStatus::Failed,
                        started_at,
                        finished_at: Utc::now(),
                        insights_processed: 0,
                        stages_completed: 0,
                        stages,
                    })
                    .await;
            }
        };

        if insights.is_empty() {
            // A quiet window is a normal outcome, not an error.
            tracing::info!(min_score = self.min_score, "no qualifying insights this cycle");
            return self
                .finish(RunRecord {
                    status: RunStatus::Completed,
                    started_at,
                    finished_at: Utc::now(),
                    insights_processed: 0,
                    stages_completed: 1,
                    stages,
                })
                .await;
        }

        tracing::info!(count = insights.len(), "running content cycle");

        stages.push(match self.generator.generate(&insights).await {
            Ok(generated) => {
                StageOutcome::ok("generation", serde_json::json!({ "generated": generated }))
            }
            Err(e) => StageOutcome::err("generation", &e),
        });

        stages.push(match self.reviewer.review(&insights).await {
            Ok(approved) => {
                StageOutcome::ok("review", serde_json::json!({ "approved": approved }))
            }
            Err(e) => StageOutcome::err("review", &e),
        });

        stages.push(match self.notifier.notify(&insights).await {
            Ok(sent) => StageOutcome::ok(
                "notification",
                serde_json::json!({ "notifications_sent": sent }),
            ),
            Err(e) => StageOutcome::err("notification", &e),
        });

        let stages_completed = stages.iter().filter(|s| s.success).count();
        let downstream_failures = stages
            .iter()
            .filter(|s| s.stage != "find" && !s.success)
            .count();
        let status = if downstream_failures == 0 {
            RunStatus::Completed
        } else if downstream_failures == 3 {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        };

        self.finish(RunRecord {
            status,
            started_at,
            finished_at: Utc::now(),
            insights_processed: insights.len(),
            stages_completed,
            stages,
        })
        .await
    }

    /// Persist the record best-effort and hand it back.
    async fn finish(&self, record: RunRecord) -> RunRecord {
        if let Err(e) = self.recorder.record(&record).await {
            tracing::error!(error = %e, "failed to persist pipeline run record");
        }
        tracing::info!(
            status = ?record.status,
            insights = record.insights_processed,
            stages_completed = record.stages_completed,
            "content cycle finished"
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    struct FakeFinder {
        candidates: anyhow::Result<Vec<InsightCandidate>>,
        calls: AtomicU32,
    }

    impl FakeFinder {
        fn with(candidates: Vec<InsightCandidate>) -> Arc<Self> {
            Arc::new(Self {
                candidates: Ok(candidates),
                calls: AtomicU32::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                candidates: Err(anyhow::anyhow!("store unavailable")),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl InsightFinder for FakeFinder {
        async fn find_qualifying(&self, _min_score: f64) -> anyhow::Result<Vec<InsightCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.candidates {
                Ok(candidates) => Ok(candidates.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    struct FakeStage {
        result: Result<u32, &'static str>,
    }

    impl FakeStage {
        fn ok(count: u32) -> Arc<Self> {
            Arc::new(Self { result: Ok(count) })
        }

        fn failing(message: &'static str) -> Arc<Self> {
            Arc::new(Self {
                result: Err(message),
            })
        }

        fn run(&self) -> anyhow::Result<u32> {
            self.result.map_err(|m| anyhow::anyhow!(m))
        }
    }

    #[async_trait]
    impl ContentGenerator for FakeStage {
        async fn generate(&self, _insights: &[InsightCandidate]) -> anyhow::Result<u32> {
            self.run()
        }
    }

    #[async_trait]
    impl QualityReviewer for FakeStage {
        async fn review(&self, _insights: &[InsightCandidate]) -> anyhow::Result<u32> {
            self.run()
        }
    }

    #[async_trait]
    impl NotificationDispatcher for FakeStage {
        async fn notify(&self, _insights: &[InsightCandidate]) -> anyhow::Result<u32> {
            self.run()
        }
    }

    #[derive(Default)]
    struct RecordingRecorder {
        records: Mutex<Vec<RunRecord>>,
    }

    #[async_trait]
    impl RunRecorder for RecordingRecorder {
        async fn record(&self, record: &RunRecord) -> anyhow::Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn candidate(id: &str, score: f64) -> InsightCandidate {
        InsightCandidate {
            id: id.to_owned(),
            title: format!("Insight {id}"),
            score,
        }
    }

    fn config(enabled: bool) -> insight_core::AppConfig {
        insight_core::AppConfig {
            env: insight_core::Environment::Test,
            log_level: "info".to_owned(),
            http_timeout_secs: 5,
            http_user_agent: "startinsight-test/0.1".to_owned(),
            http_max_retries: 0,
            http_backoff_base_ms: 0,
            reddit_client_id: None,
            reddit_client_secret: None,
            reddit_user_agent: "startinsight-test/0.1".to_owned(),
            reddit_min_score: 20,
            reddit_max_age_hours: 48,
            reddit_posts_per_subreddit: 25,
            hn_max_results: 30,
            hn_min_points: 50,
            trends_batch_size: 5,
            trends_batch_delay_ms: 0,
            trends_min_interval_ms: 0,
            url_max_redirects: 5,
            url_max_concurrent: 10,
            pipeline_enabled: enabled,
            pipeline_min_score: 7.0,
            alert_webhook_url: None,
            error_tracker_url: None,
        }
    }

    fn orchestrator(
        enabled: bool,
        finder: Arc<FakeFinder>,
        generator: Arc<FakeStage>,
        reviewer: Arc<FakeStage>,
        notifier: Arc<FakeStage>,
        recorder: Arc<RecordingRecorder>,
    ) -> Orchestrator {
        Orchestrator::new(
            &config(enabled),
            finder,
            generator,
            reviewer,
            notifier,
            recorder,
        )
    }

    #[tokio::test]
    async fn disabled_pipeline_skips_without_touching_the_store() {
        let finder = FakeFinder::with(vec![candidate("a", 9.0)]);
        let recorder = Arc::new(RecordingRecorder::default());
        let record = orchestrator(
            false,
            Arc::clone(&finder),
            FakeStage::ok(1),
            FakeStage::ok(1),
            FakeStage::ok(1),
            Arc::clone(&recorder),
        )
        .run()
        .await;

        assert_eq!(record.status, RunStatus::Skipped);
        assert_eq!(finder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.records.lock().unwrap().len(), 1, "skips are recorded too");
    }

    #[tokio::test]
    async fn empty_candidate_set_completes_early() {
        let recorder = Arc::new(RecordingRecorder::default());
        let record = orchestrator(
            true,
            FakeFinder::with(Vec::new()),
            FakeStage::ok(1),
            FakeStage::ok(1),
            FakeStage::ok(1),
            recorder,
        )
        .run()
        .await;

        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.insights_processed, 0);
        assert_eq!(record.stages.len(), 1, "only the find stage ran");
    }

    #[tokio::test]
    async fn all_stages_succeeding_completes() {
        let record = orchestrator(
            true,
            FakeFinder::with(vec![candidate("a", 9.0), candidate("b", 8.0)]),
            FakeStage::ok(2),
            FakeStage::ok(2),
            FakeStage::ok(5),
            Arc::new(RecordingRecorder::default()),
        )
        .run()
        .await;

        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.insights_processed, 2);
        assert_eq!(record.stages_completed, 4);
    }

    #[tokio::test]
    async fn one_failed_stage_yields_partial_and_later_stages_still_run() {
        let record = orchestrator(
            true,
            FakeFinder::with(vec![candidate("a", 9.0)]),
            FakeStage::failing("template engine exploded"),
            FakeStage::ok(1),
            FakeStage::ok(3),
            Arc::new(RecordingRecorder::default()),
        )
        .run()
        .await;

        assert_eq!(record.status, RunStatus::Partial);

        let generation = record
            .stages
            .iter()
            .find(|s| s.stage == "generation")
            .unwrap();
        assert!(!generation.success);
        assert!(generation.detail["error"]
            .as_str()
            .unwrap()
            .contains("template engine exploded"));

        let notification = record
            .stages
            .iter()
            .find(|s| s.stage == "notification")
            .unwrap();
        assert!(notification.success, "notification ran despite the earlier failure");
        assert_eq!(notification.detail["notifications_sent"], 3);
    }

    #[tokio::test]
    async fn every_downstream_stage_failing_yields_failed() {
        let record = orchestrator(
            true,
            FakeFinder::with(vec![candidate("a", 9.0)]),
            FakeStage::failing("boom"),
            FakeStage::failing("boom"),
            FakeStage::failing("boom"),
            Arc::new(RecordingRecorder::default()),
        )
        .run()
        .await;

        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.stages_completed, 1, "only the find stage succeeded");
    }

    #[tokio::test]
    async fn finder_failure_fails_the_run_and_is_recorded() {
        let recorder = Arc::new(RecordingRecorder::default());
        let record = orchestrator(
            true,
            FakeFinder::failing(),
            FakeStage::ok(1),
            FakeStage::ok(1),
            FakeStage::ok(1),
            Arc::clone(&recorder),
        )
        .run()
        .await;

        assert_eq!(record.status, RunStatus::Failed);
        let recorded = recorder.records.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, RunStatus::Failed);
    }
}
