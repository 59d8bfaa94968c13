//! Minimal Telegram Bot API client: text messages and photos.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::{ActionError, Result};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    result: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// How Telegram should interpret message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Sent as-is; `<` and `&` are literal.
    Plain,
    Html,
}

pub struct TelegramApi {
    client: Client,
    /// `{api}/bot{token}`
    bot_url: String,
}

impl TelegramApi {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            bot_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    /// Send a text message. Returns the message id.
    pub async fn send_message(&self, chat_id: &str, text: &str, mode: ParseMode) -> Result<i64> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if mode == ParseMode::Html {
            body["parse_mode"] = "HTML".into();
        }
        let resp = self
            .client
            .post(format!("{}/sendMessage", self.bot_url))
            .json(&body)
            .send()
            .await?;
        read_message_id(resp).await
    }

    /// Upload a photo with a caption. Returns the message id.
    pub async fn send_photo(&self, chat_id: &str, caption: &str, photo: &Path) -> Result<i64> {
        let bytes = tokio::fs::read(photo).await?;
        let file_name = photo
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "screenshot.png".into());
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", Part::bytes(bytes).file_name(file_name).mime_str("image/png")?);

        let resp = self
            .client
            .post(format!("{}/sendPhoto", self.bot_url))
            .multipart(form)
            .send()
            .await?;
        read_message_id(resp).await
    }
}

async fn read_message_id(resp: reqwest::Response) -> Result<i64> {
    let status = resp.status();
    let body = resp.text().await?;
    let parsed: ApiResponse = serde_json::from_str(&body).map_err(|_| {
        ActionError::Posting(format!("telegram HTTP {status}: {body}"))
    })?;

    match parsed {
        ApiResponse { ok: true, result: Some(msg), .. } => Ok(msg.message_id),
        ApiResponse { error_code: Some(429), .. } => Err(ActionError::Posting("telegram rate limited".into())),
        other => {
            let description = other.description.unwrap_or_else(|| status.to_string());
            warn!(%status, description = %description, "telegram API error");
            Err(ActionError::Posting(format!("telegram: {description}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> TelegramApi {
        TelegramApi::new(&server.uri(), "123:abc", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn send_message_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "-100", "text": "hello", "parse_mode": "HTML"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "result": {"message_id": 77}
            })))
            .mount(&server)
            .await;

        assert_eq!(api(&server).send_message("-100", "hello", ParseMode::Html).await.unwrap(), 77);
    }

    #[tokio::test]
    async fn send_photo_uploads_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .and(body_string_contains("name=\"photo\""))
            .and(body_string_contains("my caption"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "result": {"message_id": 78}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("shot.png");
        std::fs::write(&photo, b"png").unwrap();
        assert_eq!(api(&server).send_photo("-100", "my caption", &photo).await.unwrap(), 78);
    }

    #[tokio::test]
    async fn api_errors_are_posting_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false, "error_code": 400, "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        match api(&server).send_message("-1", "x", ParseMode::Plain).await {
            Err(ActionError::Posting(msg)) => assert!(msg.contains("chat not found")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
