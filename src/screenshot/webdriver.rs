//! W3C WebDriver client (chromedriver, geckodriver, selenium) over plain HTTP.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{BrowserLauncher, BrowserSession};
use crate::config::ScreenshotConfig;
use crate::error::{ActionError, Result};

/// Every WebDriver response wraps its payload in `value`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

async fn unwrap_value<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Envelope<WireError>>(&body)
            .map(|e| format!("{}: {}", e.value.error, e.value.message))
            .unwrap_or(body);
        return Err(ActionError::Capture(format!("webdriver HTTP {status}: {detail}")));
    }
    let envelope: Envelope<T> = response.json().await?;
    Ok(envelope.value)
}

pub struct WebDriverLauncher {
    client: Client,
    base_url: String,
    width: u32,
    height: u32,
    page_load_timeout: Duration,
}

impl WebDriverLauncher {
    pub fn new(config: &ScreenshotConfig) -> Result<Self> {
        let page_load_timeout = Duration::from_secs(config.nav_timeout_secs);
        let client = Client::builder()
            // Navigation requests block until page load, so leave slack over the page-load timeout.
            .timeout(page_load_timeout + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: config.webdriver_url.trim_end_matches('/').to_string(),
            width: config.width,
            height: config.height,
            page_load_timeout,
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--disable-gpu",
                            "--no-sandbox",
                            "--hide-scrollbars",
                            format!("--window-size={},{}", self.width, self.height),
                        ]
                    }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}/session", self.base_url))
            .json(&capabilities)
            .send()
            .await
            .map_err(|e| ActionError::Capture(format!("webdriver unreachable: {e}")))?;
        let created: NewSession = unwrap_value(response).await?;

        let session = WebDriverSession {
            client: self.client.clone(),
            url: format!("{}/session/{}", self.base_url, created.session_id),
        };
        session
            .post_unit("timeouts", json!({ "pageLoad": self.page_load_timeout.as_millis() as u64 }))
            .await?;
        session
            .post_unit("window/rect", json!({ "width": self.width, "height": self.height }))
            .await?;

        info!(session_id = %created.session_id, width = self.width, height = self.height, "browser session started");
        Ok(Box::new(session))
    }
}

pub struct WebDriverSession {
    client: Client,
    /// `{base}/session/{id}`
    url: String,
}

impl WebDriverSession {
    async fn post_unit(&self, command: &str, body: Value) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/{command}", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ActionError::Capture(format!("webdriver {command}: {e}")))?;
        let _: Value = unwrap_value(response).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url, "navigating");
        self.post_unit("url", json!({ "url": url })).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(format!("{}/screenshot", self.url))
            .send()
            .await
            .map_err(|e| ActionError::Capture(format!("webdriver screenshot: {e}")))?;
        let encoded: String = unwrap_value(response).await?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ActionError::Capture(format!("invalid screenshot encoding: {e}")))
    }

    async fn close(&self) -> Result<()> {
        let response = self
            .client
            .delete(&self.url)
            .send()
            .await
            .map_err(|e| ActionError::Capture(format!("webdriver close: {e}")))?;
        let _: Value = unwrap_value(response).await?;
        Ok(())
    }
}
