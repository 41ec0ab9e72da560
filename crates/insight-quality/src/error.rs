use thiserror::Error;

#[derive(Debug, Error)]
pub enum QualityError {
    /// Failure reported by the backing signal/insight store.
    #[error("store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {sink}")]
    UnexpectedStatus { sink: String, status: u16 },
}
