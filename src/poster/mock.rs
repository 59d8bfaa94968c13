//! Scripted poster for scheduler tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::Poster;
use crate::error::{ActionError, Result};

#[derive(Debug, Clone)]
pub struct PostCall {
    pub account_id: String,
    pub text: String,
    pub image: Option<PathBuf>,
}

/// Succeeds with sequential ids unless a failure is queued.
#[derive(Default)]
pub struct MockPoster {
    failures: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<PostCall>>,
}

impl MockPoster {
    pub fn failing_times(n: usize) -> Self {
        let poster = Self::default();
        for i in 0..n {
            poster.failures.lock().unwrap().push_back(format!("simulated outage #{}", i + 1));
        }
        poster
    }

    pub fn calls(&self) -> Vec<PostCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Poster for MockPoster {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn publish(&self, account_id: &str, text: &str, image: Option<&Path>) -> Result<String> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(PostCall {
            account_id: account_id.to_string(),
            text: text.to_string(),
            image: image.map(Path::to_path_buf),
        });
        if let Some(reason) = self.failures.lock().unwrap().pop_front() {
            return Err(ActionError::Posting(reason));
        }
        Ok(format!("post-{}", calls.len()))
    }
}
