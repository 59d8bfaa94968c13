//! Unified error types for the action pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActionError {
    /// The dedup ledger already holds an action for this source event.
    #[error("duplicate event {source_event_id} for account {account_id}")]
    DuplicateEvent {
        account_id: String,
        source_event_id: String,
    },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("screenshot capture failed: {0}")]
    Capture(String),

    #[error("posting failed: {0}")]
    Posting(String),

    #[error("retries exhausted after {retry_count} attempts: {last_error}")]
    ExhaustedRetries { retry_count: u32, last_error: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActionError {
    /// Failures that go through the backoff path and count against `max_retries`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Generation(_) | ActionError::Posting(_))
    }

    /// Store failures abort the current pass for an action without touching its retry count.
    pub fn is_persistence(&self) -> bool {
        matches!(self, ActionError::Persistence(_))
    }
}

pub type Result<T> = std::result::Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_generation_and_posting_are_retryable() {
        assert!(ActionError::Generation("empty".into()).is_retryable());
        assert!(ActionError::Posting("429".into()).is_retryable());
        assert!(!ActionError::Capture("nav".into()).is_retryable());
        assert!(!ActionError::Persistence(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(ActionError::Persistence(sqlx::Error::PoolTimedOut).is_persistence());
    }
}
