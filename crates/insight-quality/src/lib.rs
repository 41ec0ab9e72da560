//! Pipeline health monitoring: windowed quality metrics and threshold
//! alerting.

pub mod alerts;
pub mod error;
pub mod metrics;

pub use alerts::{
    default_thresholds, Alert, AlertHandler, AlertService, ChatWebhookHandler,
    ErrorTrackerHandler, Severity, Threshold, ThresholdOp, TracingAlertHandler,
};
pub use error::QualityError;
pub use metrics::{
    InsightDimensions, MetricsCollector, QualityMetrics, QualityWeights, SignalCounts, SignalStore,
};
