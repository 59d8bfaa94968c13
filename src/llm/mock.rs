//! Scripted LLM client for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::traits::{Completion, LlmClient, LlmError};

/// Replays queued results in order; falls back to a fixed reply when the queue is empty.
pub struct MockLlm {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    fallback: String,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockLlm {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, text: &str, tokens_used: u32) -> Self {
        self.script.lock().unwrap().push_back(Ok(Completion {
            text: text.to_string(),
            tokens_used,
        }));
        self
    }

    pub fn fail(self, error: LlmError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// `(system, user)` prompts of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Completion {
                text: self.fallback.clone(),
                tokens_used: 10,
            }),
        }
    }
}
