use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{subject} not found")]
    NotFound { subject: String },

    #[error("{subject} is private or forbidden")]
    Forbidden { subject: String },

    #[error("{subject} redirected (possibly misspelled)")]
    Redirected { subject: String },

    #[error("upstream server error {status} for {subject}")]
    Upstream { subject: String, status: u16 },

    #[error("rate limited (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("{service} client is not configured: {reason}")]
    NotConfigured { service: String, reason: String },

    #[error("malformed URL \"{url}\": {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("too many redirects for {url} (limit {limit})")]
    TooManyRedirects { url: String, limit: usize },
}
