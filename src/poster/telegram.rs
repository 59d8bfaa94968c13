//! Posts to a Telegram channel through the bot API.

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::Poster;
use crate::error::Result;
use crate::telegram::api::{ParseMode, TelegramApi};

pub struct TelegramPoster {
    api: TelegramApi,
    chat_id: String,
}

impl TelegramPoster {
    pub fn new(api: TelegramApi, chat_id: String) -> Self {
        Self { api, chat_id }
    }
}

#[async_trait]
impl Poster for TelegramPoster {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn publish(&self, account_id: &str, text: &str, image: Option<&Path>) -> Result<String> {
        let message_id = match image {
            Some(photo) => self.api.send_photo(&self.chat_id, text, photo).await?,
            None => self.api.send_message(&self.chat_id, text, ParseMode::Plain).await?,
        };
        info!(account_id, message_id, with_image = image.is_some(), "posted to telegram channel");
        Ok(message_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::Request;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn text_only_uses_send_message_and_image_uses_send_photo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botT/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 5}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botT/sendPhoto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 6}})))
            .expect(1)
            .mount(&server)
            .await;

        let api = TelegramApi::new(&server.uri(), "T", Duration::from_secs(5)).unwrap();
        let poster = TelegramPoster::new(api, "@channel".into());
        assert_eq!(poster.publish("acct", "text", None).await.unwrap(), "5");

        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("s.png");
        std::fs::write(&img, b"png").unwrap();
        assert_eq!(poster.publish("acct", "text", Some(&img)).await.unwrap(), "6");
    }

    #[tokio::test]
    async fn generated_text_is_sent_verbatim_without_html_parsing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botT/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 9}})))
            .mount(&server)
            .await;

        let api = TelegramApi::new(&server.uri(), "T", Duration::from_secs(5)).unwrap();
        let poster = TelegramPoster::new(api, "@channel".into());
        let text = "Odds < 5% & a wallet with <3 bets";
        poster.publish("acct", text, None).await.unwrap();

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["text"], text);
        assert!(body.get("parse_mode").is_none());
    }
}
