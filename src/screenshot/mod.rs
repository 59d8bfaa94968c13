//! Headless-browser screenshots of market and profile pages.

pub mod capturer;
#[cfg(test)]
pub mod mock;
pub mod webdriver;

use async_trait::async_trait;

use crate::error::Result;

pub use capturer::ScreenshotCapturer;
pub use webdriver::WebDriverLauncher;

/// Starts browser sessions. Called lazily, once per live session.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One live browser with a fixed-size viewport.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate and wait for the page load event.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}
