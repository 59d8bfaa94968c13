//! Lazily-launched shared browser that writes timestamped PNGs.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{BrowserLauncher, BrowserSession};
use crate::actions::types::ScreenshotMode;
use crate::config::ScreenshotConfig;
use crate::error::{ActionError, Result};

pub struct ScreenshotCapturer {
    launcher: Arc<dyn BrowserLauncher>,
    /// One session, one capture at a time.
    session: Mutex<Option<Box<dyn BrowserSession>>>,
    dir: PathBuf,
    web_url: String,
    settle: Duration,
    nav_timeout: Duration,
}

impl ScreenshotCapturer {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: &ScreenshotConfig, polymarket_web_url: &str) -> Self {
        Self {
            launcher,
            session: Mutex::new(None),
            dir: PathBuf::from(&config.dir),
            web_url: polymarket_web_url.trim_end_matches('/').to_string(),
            settle: Duration::from_millis(config.settle_ms),
            nav_timeout: Duration::from_secs(config.nav_timeout_secs),
        }
    }

    /// Page for `mode`: market slug for `Market`, wallet address for `Profile`.
    pub fn target_url(&self, mode: ScreenshotMode, identifier: &str) -> Option<String> {
        match mode {
            ScreenshotMode::None => None,
            ScreenshotMode::Market => Some(format!("{}/event/{identifier}", self.web_url)),
            ScreenshotMode::Profile => Some(format!("{}/profile/{identifier}", self.web_url)),
        }
    }

    /// Capture the page for `mode`. `Ok(None)` when the mode is `None`.
    pub async fn capture(&self, mode: ScreenshotMode, identifier: &str) -> Result<Option<PathBuf>> {
        let Some(url) = self.target_url(mode, identifier) else {
            return Ok(None);
        };
        if identifier.is_empty() {
            return Err(ActionError::Capture(format!("no identifier for {} screenshot", mode.as_str())));
        }

        let png = self.capture_png(&url).await?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let file = self.dir.join(format!(
            "{}-{}-{}.png",
            mode.as_str(),
            sanitize(identifier),
            Utc::now().format("%Y%m%d-%H%M%S%3f")
        ));
        tokio::fs::write(&file, &png).await?;
        info!(url = %url, path = %file.display(), bytes = png.len(), "screenshot captured");
        Ok(Some(file))
    }

    async fn capture_png(&self, url: &str) -> Result<Vec<u8>> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.launcher.launch().await?);
        }
        let Some(session) = guard.as_ref() else {
            return Err(ActionError::Capture("browser session unavailable".into()));
        };

        let navigated = match tokio::time::timeout(self.nav_timeout, session.navigate(url)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Capture(format!(
                "navigation timed out after {}s",
                self.nav_timeout.as_secs()
            ))),
        };
        let png = match navigated {
            Ok(()) => {
                if !self.settle.is_zero() {
                    tokio::time::sleep(self.settle).await;
                }
                session.screenshot().await
            }
            Err(e) => Err(e),
        };

        if png.is_err() {
            // A hung or broken browser is replaced on the next capture.
            if let Some(session) = guard.take() {
                if let Err(close_err) = session.close().await {
                    debug!(error = %close_err, "closing broken browser session failed");
                }
            }
        }
        png
    }

    /// Delete screenshots at least `max_age` old. Returns how many were removed.
    pub async fn cleanup(&self, max_age: Duration) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age >= max_age {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to remove screenshot"),
                }
            }
        }
        if removed > 0 {
            info!(removed, dir = %self.dir.display(), "old screenshots removed");
        }
        Ok(removed)
    }

    /// Release the browser session, if one was launched.
    pub async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            match session.close().await {
                Ok(()) => info!("browser session closed"),
                Err(e) => warn!(error = %e, "failed to close browser session"),
            }
        }
    }
}

fn sanitize(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect()
}
