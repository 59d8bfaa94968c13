//! Database row types and their mapping to domain actions.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::actions::types::{Action, ActionStatus, TradeEvent, TriggerType, WalletProfile};

#[derive(Debug, Clone, FromRow)]
pub struct DbAction {
    pub id: String,
    pub account_id: String,
    pub source_event_id: String,
    pub trigger_type: String,
    pub wallet_address: String,
    pub wallet_profile: Json<WalletProfile>,
    pub trade_event: Option<Json<TradeEvent>>,
    pub market_url: String,
    pub profile_url: String,
    pub status: String,
    pub draft_text: String,
    pub reviewed_text: String,
    pub final_text: String,
    pub screenshot_path: String,
    pub posted_id: String,
    pub tokens_used: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    pub next_retry_at: Option<i64>,
    pub error_message: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub processed_at: Option<i64>,
}

/// Per-(status, retry-pending) counts for stats queries.
#[derive(Debug, Clone, FromRow)]
pub struct DbStatusCount {
    pub status: String,
    pub retrying: i64,
    pub count: i64,
    pub tokens: i64,
}

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {ms}").into()))
}

impl TryFrom<DbAction> for Action {
    type Error = sqlx::Error;

    fn try_from(row: DbAction) -> Result<Self, Self::Error> {
        let trigger_type: TriggerType = row.trigger_type.parse().map_err(decode_err)?;
        let status: ActionStatus = row.status.parse().map_err(decode_err)?;

        Ok(Action {
            id: row.id,
            account_id: row.account_id,
            source_event_id: row.source_event_id,
            trigger_type,
            wallet_address: row.wallet_address,
            wallet_profile: row.wallet_profile.0,
            trade_event: row.trade_event.map(|j| j.0),
            market_url: row.market_url,
            profile_url: row.profile_url,
            status,
            draft_text: row.draft_text,
            reviewed_text: row.reviewed_text,
            final_text: row.final_text,
            screenshot_path: row.screenshot_path,
            posted_id: row.posted_id,
            tokens_used: row.tokens_used.max(0) as u32,
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            next_retry_at: row.next_retry_at.map(from_millis).transpose()?,
            error_message: row.error_message,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            processed_at: row.processed_at.map(from_millis).transpose()?,
        })
    }
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}
