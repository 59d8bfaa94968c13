//! Durable action queue, history and dedup ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use super::types::{Action, ActionStats, ActionStatus};
use crate::db::models::{to_millis, DbAction};
use crate::db::queries;
use crate::error::{ActionError, Result};

/// Result of an atomic create attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created,
    /// The ledger already maps this source event to `action_id`.
    Duplicate { action_id: String },
}

/// Persistence surface the trigger evaluator and scheduler depend on.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Write the action and its `(account_id, source_event_id)` ledger entry atomically.
    async fn create_if_absent(&self, action: &Action) -> Result<CreateOutcome>;

    /// Like `create_if_absent`, but a ledger hit is an `ActionError::DuplicateEvent`.
    async fn enqueue(&self, action: &Action) -> Result<()> {
        match self.create_if_absent(action).await? {
            CreateOutcome::Created => Ok(()),
            CreateOutcome::Duplicate { .. } => Err(ActionError::DuplicateEvent {
                account_id: action.account_id.clone(),
                source_event_id: action.source_event_id.clone(),
            }),
        }
    }

    /// Ledger lookup.
    async fn find_by_event(&self, account_id: &str, source_event_id: &str) -> Result<Option<String>>;

    async fn get(&self, id: &str) -> Result<Option<Action>>;

    /// `pending` actions for one account, oldest first.
    async fn dequeue_ready(&self, account_id: &str, limit: i64) -> Result<Vec<Action>>;

    /// Failed actions due for retry at `now` across all accounts, earliest first.
    async fn dequeue_retryable(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Action>>;

    /// Full replace of the mutable fields. Last writer wins.
    async fn update(&self, action: &Action) -> Result<()>;

    async fn history(&self, account_id: &str, limit: i64) -> Result<Vec<Action>>;

    async fn stats(&self, account_id: &str) -> Result<ActionStats>;

    /// Final texts of the account's most recent completed posts.
    async fn recent_posts(&self, account_id: &str, limit: i64) -> Result<Vec<String>>;

    /// Reset pre-posting in-flight actions to `pending` and return the actions
    /// that were interrupted mid-post, which need an operator decision.
    async fn recover_interrupted(&self, now: DateTime<Utc>) -> Result<Vec<Action>>;
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqlActionStore {
    pool: SqlitePool,
}

impl SqlActionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn into_actions(rows: Vec<DbAction>) -> Result<Vec<Action>> {
    rows.into_iter()
        .map(|row| Action::try_from(row).map_err(ActionError::from))
        .collect()
}

#[async_trait]
impl ActionStore for SqlActionStore {
    async fn create_if_absent(&self, action: &Action) -> Result<CreateOutcome> {
        match queries::insert_action_if_absent(&self.pool, action).await? {
            None => Ok(CreateOutcome::Created),
            Some(action_id) => Ok(CreateOutcome::Duplicate { action_id }),
        }
    }

    async fn find_by_event(&self, account_id: &str, source_event_id: &str) -> Result<Option<String>> {
        Ok(queries::find_action_id_by_event(&self.pool, account_id, source_event_id).await?)
    }

    async fn get(&self, id: &str) -> Result<Option<Action>> {
        queries::get_action(&self.pool, id)
            .await?
            .map(|row| Action::try_from(row).map_err(ActionError::from))
            .transpose()
    }

    async fn dequeue_ready(&self, account_id: &str, limit: i64) -> Result<Vec<Action>> {
        into_actions(queries::get_pending_actions(&self.pool, account_id, limit).await?)
    }

    async fn dequeue_retryable(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Action>> {
        into_actions(queries::get_retryable_actions(&self.pool, to_millis(now), limit).await?)
    }

    async fn update(&self, action: &Action) -> Result<()> {
        let rows = queries::update_action(&self.pool, action).await?;
        if rows == 0 {
            return Err(ActionError::Persistence(sqlx::Error::RowNotFound));
        }
        debug!(action_id = %action.id, status = %action.status, "action updated");
        Ok(())
    }

    async fn history(&self, account_id: &str, limit: i64) -> Result<Vec<Action>> {
        into_actions(queries::get_action_history(&self.pool, account_id, limit).await?)
    }

    async fn stats(&self, account_id: &str) -> Result<ActionStats> {
        let mut stats = ActionStats::default();
        for row in queries::get_status_counts(&self.pool, account_id).await? {
            stats.total += row.count;
            stats.tokens_used += row.tokens;
            match row.status.parse::<ActionStatus>() {
                Ok(ActionStatus::Pending) => stats.pending += row.count,
                Ok(ActionStatus::Completed) => stats.completed += row.count,
                Ok(ActionStatus::Failed) if row.retrying != 0 => stats.retrying += row.count,
                Ok(ActionStatus::Failed) => stats.failed += row.count,
                Ok(_) => stats.in_progress += row.count,
                Err(e) => warn!(account_id, error = %e, "skipping unknown status in stats"),
            }
        }
        Ok(stats)
    }

    async fn recent_posts(&self, account_id: &str, limit: i64) -> Result<Vec<String>> {
        Ok(queries::get_recent_posted_texts(&self.pool, account_id, limit).await?)
    }

    async fn recover_interrupted(&self, now: DateTime<Utc>) -> Result<Vec<Action>> {
        let reset = queries::reset_interrupted_actions(&self.pool, to_millis(now)).await?;
        if reset > 0 {
            warn!(count = reset, "reset interrupted actions to pending");
        }

        let mut interrupted = into_actions(
            queries::get_actions_by_status(&self.pool, ActionStatus::Posting.as_str()).await?,
        )?;
        for action in &mut interrupted {
            action.status = ActionStatus::Failed;
            action.next_retry_at = None;
            action.error_message =
                "interrupted while posting; not retried automatically, verify whether it was published"
                    .to_string();
            action.updated_at = now;
            action.processed_at = Some(now);
            queries::update_action(&self.pool, action).await?;
        }
        Ok(interrupted)
    }
}
