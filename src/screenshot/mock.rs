//! In-memory browser for capturer and scheduler tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{BrowserLauncher, BrowserSession};
use crate::error::{ActionError, Result};

pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Default)]
pub struct BrowserLog {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
    /// Every navigation fails while set.
    pub fail_navigation: AtomicBool,
    pub fail_screenshot: AtomicBool,
}

#[derive(Default)]
pub struct MockLauncher {
    pub log: Arc<BrowserLog>,
    pub fail_launch: bool,
}

impl MockLauncher {
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        if self.fail_launch {
            return Err(ActionError::Capture("no browser available".into()));
        }
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            log: self.log.clone(),
        }))
    }
}

struct MockSession {
    log: Arc<BrowserLog>,
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.log.navigations.lock().unwrap().push(url.to_string());
        if self.log.fail_navigation.load(Ordering::SeqCst) {
            return Err(ActionError::Capture("navigation failed".into()));
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        if self.log.fail_screenshot.load(Ordering::SeqCst) {
            return Err(ActionError::Capture("screenshot failed".into()));
        }
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(&self) -> Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
