//! LLM collaborator: a single chat-style completion call.

#[cfg(test)]
pub mod mock;
pub mod openai;
pub mod traits;

pub use openai::OpenAiClient;
pub use traits::{Completion, LlmClient, LlmError};
