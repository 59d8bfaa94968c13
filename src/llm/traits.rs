//! Contract the content generator expects from a language model.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("rate limited")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("empty response")]
    EmptyResponse,
}

/// Generated text plus total tokens billed for the call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One synchronous chat call: system instruction + user instruction.
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError>;
}
