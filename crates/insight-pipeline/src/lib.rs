//! Content-cycle orchestration over the scored insight store.

mod orchestrator;

pub use orchestrator::{
    ContentGenerator, InsightCandidate, InsightFinder, NotificationDispatcher, Orchestrator,
    QualityReviewer, RunRecord, RunRecorder, RunStatus, StageOutcome,
};
