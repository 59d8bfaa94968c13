//! Publishing collaborator: text plus at most one image, returns the external post id.

#[cfg(test)]
pub mod mock;
pub mod telegram;
pub mod twitter;

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

pub use telegram::TelegramPoster;
pub use twitter::TwitterPoster;

#[async_trait]
pub trait Poster: Send + Sync {
    fn name(&self) -> &'static str;

    /// Failures, rate limits included, are `ActionError::Posting`.
    async fn publish(&self, account_id: &str, text: &str, image: Option<&Path>) -> Result<String>;
}
