//! SQL query functions for the action table and dedup ledger.

use sqlx::types::Json;
use sqlx::SqlitePool;

use super::models::*;
use crate::actions::types::Action;

const ACTION_COLUMNS: &str = "id, account_id, source_event_id, trigger_type, wallet_address,
    wallet_profile, trade_event, market_url, profile_url, status, draft_text, reviewed_text,
    final_text, screenshot_path, posted_id, tokens_used, retry_count, max_retries,
    next_retry_at, error_message, created_at, updated_at, processed_at";

// ── Creation + dedup ledger ──────────────────────────────────────

/// Insert the action and its ledger entry in one transaction.
///
/// Returns `None` when the action was created, or the id of the action already
/// recorded for `(account_id, source_event_id)` (nothing is written in that case).
pub async fn insert_action_if_absent(
    pool: &SqlitePool,
    action: &Action,
) -> Result<Option<String>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "INSERT INTO actions ({ACTION_COLUMNS})
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&action.id)
    .bind(&action.account_id)
    .bind(&action.source_event_id)
    .bind(action.trigger_type.as_str())
    .bind(&action.wallet_address)
    .bind(Json(&action.wallet_profile))
    .bind(action.trade_event.as_ref().map(Json))
    .bind(&action.market_url)
    .bind(&action.profile_url)
    .bind(action.status.as_str())
    .bind(&action.draft_text)
    .bind(&action.reviewed_text)
    .bind(&action.final_text)
    .bind(&action.screenshot_path)
    .bind(&action.posted_id)
    .bind(action.tokens_used as i64)
    .bind(action.retry_count as i64)
    .bind(action.max_retries as i64)
    .bind(action.next_retry_at.map(to_millis))
    .bind(&action.error_message)
    .bind(to_millis(action.created_at))
    .bind(to_millis(action.updated_at))
    .bind(action.processed_at.map(to_millis))
    .execute(&mut *tx)
    .await?;

    let ledger = sqlx::query(
        "INSERT INTO action_dedup (account_id, source_event_id, action_id, created_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (account_id, source_event_id) DO NOTHING",
    )
    .bind(&action.account_id)
    .bind(&action.source_event_id)
    .bind(&action.id)
    .bind(to_millis(action.created_at))
    .execute(&mut *tx)
    .await?;

    if ledger.rows_affected() == 0 {
        let existing = sqlx::query_scalar::<_, String>(
            "SELECT action_id FROM action_dedup WHERE account_id = ? AND source_event_id = ?",
        )
        .bind(&action.account_id)
        .bind(&action.source_event_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.rollback().await?;
        return Ok(Some(existing));
    }

    tx.commit().await?;
    Ok(None)
}

pub async fn find_action_id_by_event(
    pool: &SqlitePool,
    account_id: &str,
    source_event_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT action_id FROM action_dedup WHERE account_id = ? AND source_event_id = ?",
    )
    .bind(account_id)
    .bind(source_event_id)
    .fetch_optional(pool)
    .await
}

// ── Reads ────────────────────────────────────────────────────────

pub async fn get_action(pool: &SqlitePool, id: &str) -> Result<Option<DbAction>, sqlx::Error> {
    sqlx::query_as::<_, DbAction>(&format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Pending actions for one account, oldest first.
pub async fn get_pending_actions(
    pool: &SqlitePool,
    account_id: &str,
    limit: i64,
) -> Result<Vec<DbAction>, sqlx::Error> {
    sqlx::query_as::<_, DbAction>(&format!(
        "SELECT {ACTION_COLUMNS} FROM actions
         WHERE account_id = ? AND status = 'pending'
         ORDER BY created_at ASC, rowid ASC
         LIMIT ?"
    ))
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Failed actions whose retry time has elapsed, earliest `next_retry_at` first.
pub async fn get_retryable_actions(
    pool: &SqlitePool,
    now_ms: i64,
    limit: i64,
) -> Result<Vec<DbAction>, sqlx::Error> {
    sqlx::query_as::<_, DbAction>(&format!(
        "SELECT {ACTION_COLUMNS} FROM actions
         WHERE status = 'failed'
           AND next_retry_at IS NOT NULL
           AND next_retry_at <= ?
           AND retry_count < max_retries
         ORDER BY next_retry_at ASC, rowid ASC
         LIMIT ?"
    ))
    .bind(now_ms)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn get_actions_by_status(
    pool: &SqlitePool,
    status: &str,
) -> Result<Vec<DbAction>, sqlx::Error> {
    sqlx::query_as::<_, DbAction>(&format!(
        "SELECT {ACTION_COLUMNS} FROM actions WHERE status = ? ORDER BY created_at ASC"
    ))
    .bind(status)
    .fetch_all(pool)
    .await
}

/// Newest-first history for one account.
pub async fn get_action_history(
    pool: &SqlitePool,
    account_id: &str,
    limit: i64,
) -> Result<Vec<DbAction>, sqlx::Error> {
    sqlx::query_as::<_, DbAction>(&format!(
        "SELECT {ACTION_COLUMNS} FROM actions
         WHERE account_id = ?
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?"
    ))
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn get_status_counts(
    pool: &SqlitePool,
    account_id: &str,
) -> Result<Vec<DbStatusCount>, sqlx::Error> {
    sqlx::query_as::<_, DbStatusCount>(
        "SELECT status,
                CASE WHEN next_retry_at IS NULL THEN 0 ELSE 1 END AS retrying,
                COUNT(*) AS count,
                COALESCE(SUM(tokens_used), 0) AS tokens
         FROM actions
         WHERE account_id = ?
         GROUP BY status, retrying",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
}

/// Most recently posted texts for one account.
pub async fn get_recent_posted_texts(
    pool: &SqlitePool,
    account_id: &str,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT final_text FROM actions
         WHERE account_id = ? AND status = 'completed' AND final_text <> ''
         ORDER BY processed_at DESC
         LIMIT ?",
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ── Writes ───────────────────────────────────────────────────────

/// Replace every mutable column of an action.
pub async fn update_action(pool: &SqlitePool, action: &Action) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE actions SET
            status = ?, draft_text = ?, reviewed_text = ?, final_text = ?,
            screenshot_path = ?, posted_id = ?, tokens_used = ?, retry_count = ?,
            next_retry_at = ?, error_message = ?, updated_at = ?, processed_at = ?
         WHERE id = ?",
    )
    .bind(action.status.as_str())
    .bind(&action.draft_text)
    .bind(&action.reviewed_text)
    .bind(&action.final_text)
    .bind(&action.screenshot_path)
    .bind(&action.posted_id)
    .bind(action.tokens_used as i64)
    .bind(action.retry_count as i64)
    .bind(action.next_retry_at.map(to_millis))
    .bind(&action.error_message)
    .bind(to_millis(action.updated_at))
    .bind(action.processed_at.map(to_millis))
    .bind(&action.id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Move actions stuck in a pre-posting stage back to `pending`.
pub async fn reset_interrupted_actions(pool: &SqlitePool, now_ms: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE actions SET status = 'pending', updated_at = ?
         WHERE status IN ('fetching', 'generating', 'reviewing', 'capturing')",
    )
    .bind(now_ms)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
