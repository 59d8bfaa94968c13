//! Domain types for automated actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named rule that decides whether a signal spawns an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
    FreshInsider,
    FreshWallet,
    BigTrade,
    AnyTrade,
    CustomBetCount,
}

/// Bet-count ceiling for the tight "insider" band.
pub const FRESH_INSIDER_MAX_BETS: u32 = 3;
/// Bet-count ceiling for the wider "fresh wallet" band.
pub const FRESH_WALLET_MAX_BETS: u32 = 10;

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::FreshInsider => "fresh-insider",
            TriggerType::FreshWallet => "fresh-wallet",
            TriggerType::BigTrade => "big-trade",
            TriggerType::AnyTrade => "any-trade",
            TriggerType::CustomBetCount => "custom-bet-count",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fresh-insider" => Ok(TriggerType::FreshInsider),
            "fresh-wallet" => Ok(TriggerType::FreshWallet),
            "big-trade" => Ok(TriggerType::BigTrade),
            "any-trade" => Ok(TriggerType::AnyTrade),
            "custom-bet-count" => Ok(TriggerType::CustomBetCount),
            other => Err(format!("unknown trigger type: {other}")),
        }
    }
}

/// Pipeline stage of an action.
///
/// `Failed` covers both "waiting for retry" (`next_retry_at` set) and terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Fetching,
    Generating,
    Reviewing,
    Capturing,
    Posting,
    Completed,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Fetching => "fetching",
            ActionStatus::Generating => "generating",
            ActionStatus::Reviewing => "reviewing",
            ActionStatus::Capturing => "capturing",
            ActionStatus::Posting => "posting",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "fetching" => Ok(ActionStatus::Fetching),
            "generating" => Ok(ActionStatus::Generating),
            "reviewing" => Ok(ActionStatus::Reviewing),
            "capturing" => Ok(ActionStatus::Capturing),
            "posting" => Ok(ActionStatus::Posting),
            "completed" => Ok(ActionStatus::Completed),
            "failed" => Ok(ActionStatus::Failed),
            other => Err(format!("unknown action status: {other}")),
        }
    }
}

/// What, if anything, to screenshot for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotMode {
    #[default]
    None,
    Market,
    Profile,
}

impl ScreenshotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenshotMode::None => "none",
            ScreenshotMode::Market => "market",
            ScreenshotMode::Profile => "profile",
        }
    }
}

/// Wallet snapshot captured at trigger time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletProfile {
    pub address: String,
    pub bet_count: u32,
    /// Upstream freshness classification (e.g. "insider", "fresh", "active").
    #[serde(default)]
    pub freshness: String,
    #[serde(default)]
    pub join_date: Option<DateTime<Utc>>,
}

/// Trade snapshot captured at trigger time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub market_name: String,
    pub market_slug: String,
    #[serde(default)]
    pub event_title: String,
    pub side: String,
    pub outcome: String,
    pub price: f64,
    pub size: f64,
}

impl TradeEvent {
    /// Notional value in USDC (price × size).
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// Signal delivered by the upstream market-event source.
///
/// A trade signal carries `trade`; a wallet-profile signal only carries `wallet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSignal {
    /// Source event identifier, the dedup key together with the account id.
    pub event_id: String,
    pub wallet: WalletProfile,
    #[serde(default)]
    pub trade: Option<TradeEvent>,
}

/// Per-account action settings. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub custom_bet_count: u32,
    #[serde(default)]
    pub min_trade_size: f64,
    #[serde(default)]
    pub screenshot_mode: ScreenshotMode,
    /// Overrides the default system persona when non-empty.
    #[serde(default)]
    pub custom_prompt: String,
    #[serde(default)]
    pub example_tweets: Vec<String>,
    #[serde(default)]
    pub use_historical: bool,
    #[serde(default)]
    pub review_enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_secs() -> u64 {
    60
}
fn default_max_length() -> usize {
    280
}

impl ActionsConfig {
    /// Defaults for an account using the given trigger, disabled.
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            enabled: false,
            trigger_type,
            custom_bet_count: 0,
            min_trade_size: 0.0,
            screenshot_mode: ScreenshotMode::None,
            custom_prompt: String::new(),
            example_tweets: Vec::new(),
            use_historical: false,
            review_enabled: false,
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            max_length: default_max_length(),
        }
    }
}

/// One queued or processed posting opportunity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub id: String,
    pub account_id: String,
    pub source_event_id: String,
    pub trigger_type: TriggerType,
    pub wallet_address: String,
    pub wallet_profile: WalletProfile,
    pub trade_event: Option<TradeEvent>,
    pub market_url: String,
    pub profile_url: String,
    pub status: ActionStatus,
    pub draft_text: String,
    pub reviewed_text: String,
    pub final_text: String,
    pub screenshot_path: String,
    pub posted_id: String,
    pub tokens_used: u32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Action {
    /// Build a fresh `pending` action from a matched signal.
    pub fn from_signal(
        account_id: &str,
        config: &ActionsConfig,
        signal: &MarketSignal,
        polymarket_web_url: &str,
    ) -> Self {
        let now = Utc::now();
        let base = polymarket_web_url.trim_end_matches('/');
        let market_url = signal
            .trade
            .as_ref()
            .map(|t| format!("{}/event/{}", base, t.market_slug))
            .unwrap_or_default();
        let profile_url = format!("{}/profile/{}", base, signal.wallet.address);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            source_event_id: signal.event_id.clone(),
            trigger_type: config.trigger_type,
            wallet_address: signal.wallet.address.clone(),
            wallet_profile: signal.wallet.clone(),
            trade_event: signal.trade.clone(),
            market_url,
            profile_url,
            status: ActionStatus::Pending,
            draft_text: String::new(),
            reviewed_text: String::new(),
            final_text: String::new(),
            screenshot_path: String::new(),
            posted_id: String::new(),
            tokens_used: 0,
            retry_count: 0,
            max_retries: config.max_retries,
            next_retry_at: None,
            error_message: String::new(),
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self.status {
            ActionStatus::Completed => true,
            ActionStatus::Failed => self.next_retry_at.is_none(),
            _ => false,
        }
    }
}

/// Aggregate view over one account's actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub retrying: i64,
    pub failed: i64,
    pub tokens_used: i64,
}
