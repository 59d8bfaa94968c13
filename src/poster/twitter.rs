//! X (Twitter) API v2 poster: optional media upload, then create the post.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::Poster;
use crate::error::{ActionError, Result};

#[derive(Debug, Deserialize)]
struct DataId {
    data: IdOnly,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

pub struct TwitterPoster {
    client: Client,
    api_url: String,
    bearer_token: String,
}

impl TwitterPoster {
    pub fn new(api_url: &str, bearer_token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            bearer_token,
        })
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.bearer_token)
    }

    async fn upload_media(&self, image: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image).await?;
        let form = Form::new()
            .text("media_category", "tweet_image")
            .part("media", Part::bytes(bytes).file_name("screenshot.png").mime_str("image/png")?);

        let resp = self
            .client
            .post(format!("{}/2/media/upload", self.api_url))
            .header(header::AUTHORIZATION, self.auth())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ActionError::Posting(format!("media upload: {e}")))?;
        let media: DataId = read_data(resp, "media upload").await?;
        debug!(media_id = %media.data.id, "media uploaded");
        Ok(media.data.id)
    }
}

async fn read_data(resp: Response, what: &str) -> Result<DataId> {
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ActionError::Posting(format!("{what}: rate limited")));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ActionError::Posting(format!("{what}: HTTP {status}: {body}")));
    }
    resp.json()
        .await
        .map_err(|e| ActionError::Posting(format!("{what}: unexpected response: {e}")))
}

#[async_trait]
impl Poster for TwitterPoster {
    fn name(&self) -> &'static str {
        "twitter"
    }

    async fn publish(&self, account_id: &str, text: &str, image: Option<&Path>) -> Result<String> {
        let mut body = json!({ "text": text });
        if let Some(image) = image {
            let media_id = self.upload_media(image).await?;
            body["media"] = json!({ "media_ids": [media_id] });
        }

        let resp = self
            .client
            .post(format!("{}/2/tweets", self.api_url))
            .header(header::AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await
            .map_err(|e| ActionError::Posting(format!("create post: {e}")))?;
        let post: DataId = read_data(resp, "create post").await?;
        info!(account_id, post_id = %post.data.id, with_image = image.is_some(), "posted to x");
        Ok(post.data.id)
    }
}
