#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Runtime configuration for the ingestion and quality pipeline.
///
/// Built from environment variables by [`crate::load_app_config`]. Scraper
/// and verifier components receive the knobs they need through their
/// constructors; nothing reads the environment after startup.
#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,

    /// Per-request timeout applied to every outbound HTTP call.
    pub http_timeout_secs: u64,
    pub http_user_agent: String,
    /// Additional attempts after the first failure for retriable errors.
    pub http_max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub http_backoff_base_ms: u64,

    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_user_agent: String,
    pub reddit_min_score: i64,
    /// Posts older than this are dropped even when they still rank hot.
    pub reddit_max_age_hours: i64,
    pub reddit_posts_per_subreddit: usize,

    pub hn_max_results: usize,
    pub hn_min_points: i64,

    pub trends_batch_size: usize,
    pub trends_batch_delay_ms: u64,
    /// Minimum spacing between consecutive trends API calls.
    pub trends_min_interval_ms: u64,

    pub url_max_redirects: usize,
    pub url_max_concurrent: usize,

    pub pipeline_enabled: bool,
    pub pipeline_min_score: f64,

    pub alert_webhook_url: Option<String>,
    pub error_tracker_url: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field("http_max_retries", &self.http_max_retries)
            .field("http_backoff_base_ms", &self.http_backoff_base_ms)
            .field(
                "reddit_client_id",
                &self.reddit_client_id.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "reddit_client_secret",
                &self.reddit_client_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("reddit_user_agent", &self.reddit_user_agent)
            .field("reddit_min_score", &self.reddit_min_score)
            .field("reddit_max_age_hours", &self.reddit_max_age_hours)
            .field("reddit_posts_per_subreddit", &self.reddit_posts_per_subreddit)
            .field("hn_max_results", &self.hn_max_results)
            .field("hn_min_points", &self.hn_min_points)
            .field("trends_batch_size", &self.trends_batch_size)
            .field("trends_batch_delay_ms", &self.trends_batch_delay_ms)
            .field("trends_min_interval_ms", &self.trends_min_interval_ms)
            .field("url_max_redirects", &self.url_max_redirects)
            .field("url_max_concurrent", &self.url_max_concurrent)
            .field("pipeline_enabled", &self.pipeline_enabled)
            .field("pipeline_min_score", &self.pipeline_min_score)
            .field(
                "alert_webhook_url",
                &self.alert_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "error_tracker_url",
                &self.error_tracker_url.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
