//! Configuration: TOML file defaults + environment variable overrides.
//!
//! Pipeline parameters and per-account action settings live in `config/default.toml`.
//! Secrets (API keys, bot tokens) come from environment variables.

use serde::Deserialize;
use std::collections::HashMap;
use std::env;

use crate::actions::types::ActionsConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_polymarket_web_url")]
    pub polymarket_web_url: String,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub fetcher: FetcherConfig,
    pub screenshot: ScreenshotConfig,
    pub poster: PosterConfig,
    pub scheduler: SchedulerConfig,
    pub telegram: TelegramConfig,
    pub web: WebConfig,
    pub logging: LoggingConfig,
    /// Per-account action settings keyed by account id.
    #[serde(default)]
    pub accounts: HashMap<String, ActionsConfig>,
}

fn default_polymarket_web_url() -> String {
    "https://polymarket.com".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://data/actions.db".into()
}
fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_max_tokens() -> u32 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_gamma_url")]
    pub gamma_base_url: String,
    #[serde(default = "default_data_api_url")]
    pub data_api_url: String,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".into()
}
fn default_data_api_url() -> String {
    "https://data-api.polymarket.com".into()
}
fn default_fetch_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenshotConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_screenshot_dir")]
    pub dir: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Extra wait after page load for client-rendered content.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_nav_timeout")]
    pub nav_timeout_secs: u64,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_screenshot_dir() -> String {
    "data/screenshots".into()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    800
}
fn default_settle_ms() -> u64 {
    3000
}
fn default_nav_timeout() -> u64 {
    30
}
fn default_max_age_hours() -> u64 {
    24
}

/// Which publishing backend the pipeline posts through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PosterKind {
    Twitter,
    Telegram,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PosterConfig {
    #[serde(default = "default_poster_kind")]
    pub kind: PosterKind,
    #[serde(default = "default_twitter_url")]
    pub twitter_api_url: String,
    #[serde(default)]
    pub twitter_bearer_token: Option<String>,
    /// Channel the telegram poster publishes to (distinct from the alert chat).
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_post_timeout")]
    pub timeout_secs: u64,
}

fn default_poster_kind() -> PosterKind {
    PosterKind::Twitter
}
fn default_twitter_url() -> String {
    "https://api.x.com".into()
}
fn default_post_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_queue_interval")]
    pub queue_interval_secs: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Maximum actions dequeued per account per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_queue_interval() -> u64 {
    30
}
fn default_retry_interval() -> u64 {
    60
}
fn default_cleanup_interval() -> u64 {
    3600
}
fn default_batch_size() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_output: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from `config/default.toml` merged with env vars.
    /// Secrets come from unprefixed env vars.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("PM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = builder.try_deserialize()?;
        cfg.apply_secret_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override secrets from env (these should never be in TOML).
    fn apply_secret_overrides(&mut self) {
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = env::var("TWITTER_BEARER_TOKEN") {
            self.poster.twitter_bearer_token = Some(v);
        }
        if let Ok(v) = env::var("TELEGRAM_POST_CHAT_ID") {
            self.poster.telegram_chat_id = Some(v);
        }
        if let Ok(v) = env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Ok(v) = env::var("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler.queue_interval_secs == 0 || self.scheduler.retry_interval_secs == 0 {
            anyhow::bail!("scheduler intervals must be non-zero");
        }
        for (account_id, actions) in &self.accounts {
            if actions.max_length < 20 {
                anyhow::bail!("account {account_id}: max_length must be at least 20");
            }
        }
        Ok(())
    }
}
