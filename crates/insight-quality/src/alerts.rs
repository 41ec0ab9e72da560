//! Threshold alerting over quality metric snapshots.
//!
//! [`AlertService::check_and_alert`] evaluates every registered
//! [`Threshold`] against a [`QualityMetrics`] snapshot, suppresses repeats
//! of the same `(metric, severity)` inside a rolling one-hour window, and
//! fans breaches out to the registered handlers best-effort.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QualityError;
use crate::metrics::QualityMetrics;

/// Repeat alerts for one `(metric, severity)` are suppressed inside this
/// window.
const DEDUP_WINDOW: Duration = Duration::hours(1);
/// History entries older than this are pruned on every check.
const HISTORY_RETENTION: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fired alert. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub severity: Severity,
    pub metric_name: String,
    pub threshold: f64,
    pub actual_value: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Strict comparison direction for a threshold. Equality never breaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOp {
    LessThan,
    GreaterThan,
}

impl ThresholdOp {
    #[must_use]
    pub fn breached(self, actual: f64, threshold: f64) -> bool {
        match self {
            ThresholdOp::LessThan => actual < threshold,
            ThresholdOp::GreaterThan => actual > threshold,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdOp::LessThan => "<",
            ThresholdOp::GreaterThan => ">",
        }
    }
}

/// Configuration for one alerting rule.
///
/// Thresholds for the same metric at increasing severity must be
/// monotonically stricter in the direction of `op` (e.g. warning at < 0.80,
/// critical at < 0.60).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold {
    pub metric_name: String,
    pub op: ThresholdOp,
    pub value: f64,
    pub severity: Severity,
    pub title: String,
    /// `{actual}` and `{threshold}` placeholders are substituted at fire
    /// time.
    pub message_template: String,
}

impl Threshold {
    fn render_message(&self, actual: f64) -> String {
        self.message_template
            .replace("{actual}", &format!("{actual:.2}"))
            .replace("{threshold}", &format!("{:.2}", self.value))
    }
}

/// Alert transport. One failing handler must not keep the others from
/// running; the service logs and continues.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, alert: &Alert) -> Result<(), QualityError>;
}

/// Built-in handler: structured log line at a level mapped from severity.
pub struct TracingAlertHandler;

#[async_trait]
impl AlertHandler for TracingAlertHandler {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn handle(&self, alert: &Alert) -> Result<(), QualityError> {
        match alert.severity {
            Severity::Info => tracing::info!(
                metric = %alert.metric_name,
                threshold = alert.threshold,
                actual = alert.actual_value,
                "quality alert: {}",
                alert.message
            ),
            Severity::Warning => tracing::warn!(
                metric = %alert.metric_name,
                threshold = alert.threshold,
                actual = alert.actual_value,
                "quality alert: {}",
                alert.message
            ),
            Severity::Error => tracing::error!(
                metric = %alert.metric_name,
                threshold = alert.threshold,
                actual = alert.actual_value,
                "quality alert: {}",
                alert.message
            ),
            Severity::Critical => tracing::error!(
                metric = %alert.metric_name,
                threshold = alert.threshold,
                actual = alert.actual_value,
                critical = true,
                "quality alert: {}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// Optional handler posting every alert to an error-tracking endpoint as
/// structured JSON.
pub struct ErrorTrackerHandler {
    client: reqwest::Client,
    endpoint: String,
}

impl ErrorTrackerHandler {
    /// # Errors
    ///
    /// Returns [`QualityError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &insight_core::AppConfig, endpoint: &str) -> Result<Self, QualityError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .user_agent(config.http_user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
        })
    }
}

#[async_trait]
impl AlertHandler for ErrorTrackerHandler {
    fn name(&self) -> &'static str {
        "error_tracker"
    }

    async fn handle(&self, alert: &Alert) -> Result<(), QualityError> {
        let response = self.client.post(&self.endpoint).json(alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(QualityError::UnexpectedStatus {
                sink: "error_tracker".to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Optional handler posting error/critical alerts to a chat webhook.
///
/// The post is spawned onto the runtime so the caller never waits on chat
/// latency; delivery failures surface only in the logs.
pub struct ChatWebhookHandler {
    client: reqwest::Client,
    webhook_url: String,
}

impl ChatWebhookHandler {
    /// # Errors
    ///
    /// Returns [`QualityError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &insight_core::AppConfig, webhook_url: &str) -> Result<Self, QualityError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .user_agent(config.http_user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.to_owned(),
        })
    }

    fn format_message(alert: &Alert) -> String {
        format!(
            "Quality alert: {metric}\nSeverity: {severity}\nMetric: {metric}\nThreshold: {threshold}\nActual: {actual:.2}\n{message}\nAt: {timestamp}",
            metric = alert.metric_name,
            severity = alert.severity,
            threshold = alert.threshold,
            actual = alert.actual_value,
            message = alert.message,
            timestamp = alert.timestamp.to_rfc3339(),
        )
    }
}

#[async_trait]
impl AlertHandler for ChatWebhookHandler {
    fn name(&self) -> &'static str {
        "chat_webhook"
    }

    async fn handle(&self, alert: &Alert) -> Result<(), QualityError> {
        // Only error/critical reach chat, to keep the channel quiet.
        if alert.severity < Severity::Error {
            return Ok(());
        }

        let body = serde_json::json!({ "text": Self::format_message(alert) });
        let client = self.client.clone();
        let url = self.webhook_url.clone();
        let alert_id = alert.id;
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(
                        alert_id = %alert_id,
                        status = response.status().as_u16(),
                        "chat webhook rejected alert"
                    );
                }
                Err(e) => {
                    tracing::warn!(alert_id = %alert_id, error = %e, "chat webhook post failed");
                }
                Ok(_) => {}
            }
        });
        Ok(())
    }
}

/// Evaluates thresholds and dispatches alerts.
pub struct AlertService {
    thresholds: Vec<Threshold>,
    handlers: Vec<Arc<dyn AlertHandler>>,
    history: Mutex<Vec<Alert>>,
}

impl AlertService {
    /// Service with the default threshold catalog and the tracing handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            thresholds: default_thresholds(),
            handlers: vec![Arc::new(TracingAlertHandler)],
            history: Mutex::new(Vec::new()),
        }
    }

    /// Build from app config, attaching the optional webhook/error-tracker
    /// handlers when their URLs are configured.
    ///
    /// # Errors
    ///
    /// Returns [`QualityError::Http`] if a handler's HTTP client cannot be
    /// built.
    pub fn from_config(config: &insight_core::AppConfig) -> Result<Self, QualityError> {
        let mut service = Self::new();
        if let Some(endpoint) = &config.error_tracker_url {
            service.add_handler(Arc::new(ErrorTrackerHandler::new(config, endpoint)?));
        }
        if let Some(url) = &config.alert_webhook_url {
            service.add_handler(Arc::new(ChatWebhookHandler::new(config, url)?));
        }
        Ok(service)
    }

    /// Register an additional threshold alongside the built-in catalog.
    ///
    /// Logs a warning when the new rule is not monotonically consistent
    /// with an existing rule for the same metric.
    pub fn add_threshold(&mut self, threshold: Threshold) {
        for existing in &self.thresholds {
            if existing.metric_name == threshold.metric_name
                && existing.op == threshold.op
                && existing.severity < threshold.severity
            {
                let consistent = match threshold.op {
                    ThresholdOp::LessThan => threshold.value <= existing.value,
                    ThresholdOp::GreaterThan => threshold.value >= existing.value,
                };
                if !consistent {
                    tracing::warn!(
                        metric = %threshold.metric_name,
                        "higher-severity threshold is looser than a lower-severity one"
                    );
                }
            }
        }
        self.thresholds.push(threshold);
    }

    pub fn add_handler(&mut self, handler: Arc<dyn AlertHandler>) {
        self.handlers.push(handler);
    }

    /// Evaluate every threshold against `metrics` and dispatch breaches.
    ///
    /// Returns the alerts actually dispatched (deduplicated repeats are
    /// omitted).
    pub async fn check_and_alert(&self, metrics: &QualityMetrics) -> Vec<Alert> {
        self.check_and_alert_at(metrics, Utc::now()).await
    }

    /// Clock-injectable variant of [`AlertService::check_and_alert`].
    pub async fn check_and_alert_at(
        &self,
        metrics: &QualityMetrics,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        self.prune_history(now);

        let mut dispatched = Vec::new();
        for threshold in &self.thresholds {
            let Some(actual) = metric_value(metrics, &threshold.metric_name) else {
                tracing::warn!(
                    metric = %threshold.metric_name,
                    "threshold references an unknown metric"
                );
                continue;
            };
            if !threshold.op.breached(actual, threshold.value) {
                continue;
            }

            if self.is_duplicate(&threshold.metric_name, threshold.severity, now) {
                tracing::debug!(
                    metric = %threshold.metric_name,
                    severity = %threshold.severity,
                    "suppressing duplicate alert inside dedup window"
                );
                continue;
            }

            let alert = Alert {
                id: Uuid::new_v4(),
                severity: threshold.severity,
                metric_name: threshold.metric_name.clone(),
                threshold: threshold.value,
                actual_value: actual,
                message: threshold.render_message(actual),
                timestamp: now,
            };
            self.history
                .lock()
                .expect("alert history lock poisoned")
                .push(alert.clone());
            self.dispatch(&alert).await;
            dispatched.push(alert);
        }
        dispatched
    }

    /// Alerts currently retained for deduplication.
    #[must_use]
    pub fn history(&self) -> Vec<Alert> {
        self.history
            .lock()
            .expect("alert history lock poisoned")
            .clone()
    }

    async fn dispatch(&self, alert: &Alert) {
        for handler in &self.handlers {
            if let Err(e) = handler.handle(alert).await {
                tracing::error!(
                    handler = handler.name(),
                    alert_id = %alert.id,
                    error = %e,
                    "alert handler failed — continuing with remaining handlers"
                );
            }
        }
    }

    fn is_duplicate(&self, metric_name: &str, severity: Severity, now: DateTime<Utc>) -> bool {
        self.history
            .lock()
            .expect("alert history lock poisoned")
            .iter()
            .any(|a| {
                a.metric_name == metric_name
                    && a.severity == severity
                    && now - a.timestamp < DEDUP_WINDOW
            })
    }

    fn prune_history(&self, now: DateTime<Utc>) {
        self.history
            .lock()
            .expect("alert history lock poisoned")
            .retain(|a| now - a.timestamp < HISTORY_RETENTION);
    }
}

impl Default for AlertService {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a threshold's metric by name on a snapshot.
#[allow(clippy::cast_precision_loss)]
fn metric_value(metrics: &QualityMetrics, name: &str) -> Option<f64> {
    match name {
        "validation_pass_rate" => Some(metrics.validation_pass_rate),
        "duplicate_rate" => Some(metrics.duplicate_rate),
        "llm_error_rate" => Some(metrics.llm_error_rate),
        "backlog_ratio" => Some(metrics.backlog_ratio),
        "total_signals_collected" => Some(metrics.total_signals_collected as f64),
        "total_insights_generated" => Some(metrics.total_insights_generated as f64),
        "average_relevance" => metrics.dimension_averages.get("relevance").copied(),
        _ => None,
    }
}

/// The built-in alerting catalog. Callers extend it at runtime via
/// [`AlertService::add_threshold`].
#[must_use]
pub fn default_thresholds() -> Vec<Threshold> {
    vec![
        Threshold {
            metric_name: "validation_pass_rate".to_owned(),
            op: ThresholdOp::LessThan,
            value: 0.80,
            severity: Severity::Warning,
            title: "Validation pass rate degraded".to_owned(),
            message_template: "validation pass rate {actual} is below {threshold}".to_owned(),
        },
        Threshold {
            metric_name: "validation_pass_rate".to_owned(),
            op: ThresholdOp::LessThan,
            value: 0.60,
            severity: Severity::Critical,
            title: "Validation pass rate critical".to_owned(),
            message_template: "validation pass rate {actual} is below {threshold}".to_owned(),
        },
        Threshold {
            metric_name: "duplicate_rate".to_owned(),
            op: ThresholdOp::GreaterThan,
            value: 0.30,
            severity: Severity::Warning,
            title: "Duplicate rate elevated".to_owned(),
            message_template: "duplicate rate {actual} is above {threshold}".to_owned(),
        },
        Threshold {
            metric_name: "llm_error_rate".to_owned(),
            op: ThresholdOp::GreaterThan,
            value: 0.20,
            severity: Severity::Error,
            title: "LLM error rate elevated".to_owned(),
            message_template: "llm error rate {actual} is above {threshold}".to_owned(),
        },
        Threshold {
            metric_name: "average_relevance".to_owned(),
            op: ThresholdOp::LessThan,
            value: 4.0,
            severity: Severity::Warning,
            title: "Average relevance degraded".to_owned(),
            message_template: "average relevance {actual} is below {threshold}".to_owned(),
        },
        Threshold {
            metric_name: "total_signals_collected".to_owned(),
            op: ThresholdOp::LessThan,
            value: 10.0,
            severity: Severity::Warning,
            title: "Signal volume low".to_owned(),
            message_template: "only {actual} signals collected (expected at least {threshold})"
                .to_owned(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn metrics() -> QualityMetrics {
        QualityMetrics {
            period_start: Utc::now() - Duration::hours(24),
            period_end: Utc::now(),
            total_signals_collected: 100,
            signals_by_source: BTreeMap::new(),
            duplicate_count: 0,
            duplicate_rate: 0.0,
            total_insights_generated: 10,
            validation_pass_count: 10,
            validation_fail_count: 0,
            validation_pass_rate: 1.0,
            llm_error_count: 0,
            llm_error_rate: 0.0,
            processing_backlog: 0,
            backlog_ratio: 0.0,
            dimension_averages: BTreeMap::from([("relevance".to_owned(), 8.0)]),
            score_distribution: BTreeMap::new(),
        }
    }

    struct CountingHandler {
        calls: AtomicU32,
        fail: bool,
    }

    impl CountingHandler {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl AlertHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _alert: &Alert) -> Result<(), QualityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(QualityError::Store("handler exploded".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn healthy_metrics_fire_nothing() {
        let service = AlertService::new();
        let alerts = service.check_and_alert(&metrics()).await;
        assert!(alerts.is_empty(), "got: {alerts:?}");
    }

    #[tokio::test]
    async fn exact_threshold_value_does_not_breach() {
        let service = AlertService::new();
        let mut m = metrics();
        m.validation_pass_rate = 0.80;
        assert!(service.check_and_alert(&m).await.is_empty());

        m.validation_pass_rate = 0.7999;
        let alerts = service.check_and_alert(&m).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn deep_breach_fires_warning_and_critical_together() {
        let service = AlertService::new();
        let mut m = metrics();
        m.validation_pass_rate = 0.55;
        let alerts = service.check_and_alert(&m).await;

        let severities: Vec<Severity> = alerts.iter().map(|a| a.severity).collect();
        assert!(severities.contains(&Severity::Warning));
        assert!(severities.contains(&Severity::Critical));
        assert_eq!(alerts.len(), 2, "different severities never dedup each other");
    }

    #[tokio::test]
    async fn repeats_dedup_inside_an_hour_and_refire_after() {
        let service = AlertService::new();
        let mut m = metrics();
        m.duplicate_rate = 0.5;

        let t0 = Utc::now();
        let first = service.check_and_alert_at(&m, t0).await;
        assert_eq!(first.len(), 1);

        let again = service
            .check_and_alert_at(&m, t0 + Duration::minutes(30))
            .await;
        assert!(again.is_empty(), "suppressed inside the 1-hour window");

        let later = service
            .check_and_alert_at(&m, t0 + Duration::minutes(61))
            .await;
        assert_eq!(later.len(), 1, "refires after the window expires");
    }

    #[tokio::test]
    async fn handler_failure_does_not_stop_the_rest() {
        let failing = CountingHandler::new(true);
        let healthy = CountingHandler::new(false);

        let mut service = AlertService::new();
        service.add_handler(Arc::clone(&failing) as Arc<dyn AlertHandler>);
        service.add_handler(Arc::clone(&healthy) as Arc<dyn AlertHandler>);

        let mut m = metrics();
        m.llm_error_rate = 0.9;
        let alerts = service.check_and_alert(&m).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            healthy.calls.load(Ordering::SeqCst),
            1,
            "handlers after a failing one still run"
        );
    }

    #[tokio::test]
    async fn history_is_pruned_after_24_hours() {
        let service = AlertService::new();
        let mut m = metrics();
        m.duplicate_rate = 0.5;

        let t0 = Utc::now();
        service.check_and_alert_at(&m, t0).await;
        assert_eq!(service.history().len(), 1);

        let healthy = metrics();
        service
            .check_and_alert_at(&healthy, t0 + Duration::hours(25))
            .await;
        assert!(service.history().is_empty(), "old entries pruned on every check");
    }

    #[tokio::test]
    async fn custom_thresholds_extend_the_catalog() {
        let mut service = AlertService::new();
        service.add_threshold(Threshold {
            metric_name: "total_insights_generated".to_owned(),
            op: ThresholdOp::LessThan,
            value: 5.0,
            severity: Severity::Info,
            title: "Few insights".to_owned(),
            message_template: "only {actual} insights generated".to_owned(),
        });

        let mut m = metrics();
        m.total_insights_generated = 2;
        let alerts = service.check_and_alert(&m).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert!(alerts[0].message.contains("2.00"));
    }

    #[test]
    fn message_template_substitutes_values() {
        let threshold = &default_thresholds()[0];
        let message = threshold.render_message(0.5);
        assert_eq!(message, "validation pass rate 0.50 is below 0.80");
    }
}
