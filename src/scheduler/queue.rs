//! The action state machine.
//!
//! One task owns all three passes, so actions are processed strictly one at a
//! time: one LLM call, one browser capture and one post in flight at most.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::backoff::backoff_delay;
use crate::actions::accounts::AccountConfigs;
use crate::actions::fetcher::ContentFetcher;
use crate::actions::generator::{finalize, ContentGenerator, GenerationContext};
use crate::actions::prompts::DRAFT_HISTORICAL_EXAMPLES;
use crate::actions::store::ActionStore;
use crate::actions::types::{Action, ActionStatus, ActionsConfig, ScreenshotMode};
use crate::config::SchedulerConfig;
use crate::error::{ActionError, Result};
use crate::events::bus::{ActionEvent, EventBus};
use crate::poster::Poster;
use crate::screenshot::ScreenshotCapturer;

pub struct QueueScheduler {
    store: Arc<dyn ActionStore>,
    accounts: Arc<dyn AccountConfigs>,
    generator: Arc<ContentGenerator>,
    poster: Arc<dyn Poster>,
    event_bus: Arc<EventBus>,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    capturer: Option<Arc<ScreenshotCapturer>>,
    config: SchedulerConfig,
    post_timeout: Duration,
    screenshot_max_age: Duration,
    /// Rows whose last write failed, keyed by action id. Written back before every pass.
    unflushed: Mutex<HashMap<String, Action>>,
    shutdown: watch::Receiver<bool>,
}

impl QueueScheduler {
    pub fn new(
        store: Arc<dyn ActionStore>,
        accounts: Arc<dyn AccountConfigs>,
        generator: Arc<ContentGenerator>,
        poster: Arc<dyn Poster>,
        event_bus: Arc<EventBus>,
        config: SchedulerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            accounts,
            generator,
            poster,
            event_bus,
            fetcher: None,
            capturer: None,
            config,
            post_timeout: Duration::from_secs(30),
            screenshot_max_age: Duration::from_secs(24 * 3600),
            unflushed: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_capturer(mut self, capturer: Arc<ScreenshotCapturer>, max_age: Duration) -> Self {
        self.capturer = Some(capturer);
        self.screenshot_max_age = max_age;
        self
    }

    pub fn with_post_timeout(mut self, timeout: Duration) -> Self {
        self.post_timeout = timeout;
        self
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Recover, then tick the queue, retry and cleanup passes until shutdown.
    pub async fn run(&self) {
        self.recover().await;

        let mut shutdown = self.shutdown.clone();
        let mut queue_tick = interval(Duration::from_secs(self.config.queue_interval_secs));
        let mut retry_tick = interval(Duration::from_secs(self.config.retry_interval_secs));
        let mut cleanup_tick = interval(Duration::from_secs(self.config.cleanup_interval_secs.max(1)));
        for tick in [&mut queue_tick, &mut retry_tick, &mut cleanup_tick] {
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        info!(
            queue_interval_secs = self.config.queue_interval_secs,
            retry_interval_secs = self.config.retry_interval_secs,
            poster = self.poster.name(),
            screenshots = self.capturer.is_some(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = queue_tick.tick() => {
                    self.run_queue_pass().await;
                }
                _ = retry_tick.tick() => {
                    self.run_retry_pass(Utc::now()).await;
                }
                _ = cleanup_tick.tick() => {
                    self.run_cleanup().await;
                }
            }
            if self.stopping() {
                break;
            }
        }
        self.flush_unflushed().await;
        let held = self.unflushed.lock().await.len();
        if held > 0 {
            error!(held, "scheduler stopped with unwritten action state");
        }
        info!("scheduler stopped");
    }

    /// Startup crash recovery. Actions interrupted mid-post become terminal failures.
    pub async fn recover(&self) -> usize {
        match self.store.recover_interrupted(Utc::now()).await {
            Ok(interrupted) => {
                for action in &interrupted {
                    error!(
                        action_id = %action.id,
                        account_id = %action.account_id,
                        "action was interrupted while posting, needs manual review"
                    );
                    self.event_bus.publish(ActionEvent::Failed(action.clone()));
                }
                interrupted.len()
            }
            Err(e) => {
                error!(error = %e, "crash recovery failed");
                0
            }
        }
    }

    /// Drive every enabled account's pending actions once. Returns how many were processed.
    pub async fn run_queue_pass(&self) -> usize {
        self.flush_unflushed().await;
        let snapshot = match self.accounts.snapshot().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to load account configs");
                return 0;
            }
        };

        let mut processed = 0;
        for (account_id, config) in snapshot.iter().filter(|(_, c)| c.enabled) {
            let ready = match self.store.dequeue_ready(account_id, self.config.batch_size).await {
                Ok(r) => r,
                Err(e) => {
                    error!(account_id = %account_id, error = %e, "failed to dequeue pending actions");
                    continue;
                }
            };
            for action in ready {
                if self.stopping() {
                    return processed;
                }
                self.run_action(action, config).await;
                processed += 1;
            }
        }
        if processed > 0 {
            debug!(processed, "queue pass finished");
        }
        processed
    }

    /// Re-run failed actions whose backoff elapsed at `now`. Returns how many were processed.
    pub async fn run_retry_pass(&self, now: DateTime<Utc>) -> usize {
        self.flush_unflushed().await;
        let snapshot = match self.accounts.snapshot().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to load account configs");
                return 0;
            }
        };
        let due = match self.store.dequeue_retryable(now, self.config.batch_size).await {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "failed to dequeue retryable actions");
                return 0;
            }
        };

        let mut processed = 0;
        for mut action in due {
            if self.stopping() {
                break;
            }
            match snapshot.get(&action.account_id) {
                None => {
                    let err = ActionError::Config(format!("no configuration for account {}", action.account_id));
                    if let Err(e) = self.fail_terminally(&mut action, err.to_string()).await {
                        error!(action_id = %action.id, error = %e, "failed to record terminal failure");
                    }
                }
                Some(config) if !config.enabled => {
                    // Keep it queued without spending an attempt.
                    action.next_retry_at = Some(after(now, backoff_delay(config.retry_backoff_secs, action.retry_count)));
                    action.updated_at = now;
                    match self.store.update(&action).await {
                        Ok(()) => debug!(action_id = %action.id, "retry deferred, account disabled"),
                        Err(e) => error!(action_id = %action.id, error = %e, "failed to defer retry"),
                    }
                }
                Some(config) => {
                    info!(
                        action_id = %action.id,
                        account_id = %action.account_id,
                        retry_count = action.retry_count,
                        "retrying action"
                    );
                    self.run_action(action, config).await;
                }
            }
            processed += 1;
        }
        processed
    }

    /// Delete old screenshots.
    pub async fn run_cleanup(&self) {
        let Some(capturer) = &self.capturer else { return };
        if let Err(e) = capturer.cleanup(self.screenshot_max_age).await {
            warn!(error = %e, "screenshot cleanup failed");
        }
    }

    /// Number of actions whose last write is still waiting to reach the store.
    #[cfg(test)]
    pub(crate) async fn unflushed_count(&self) -> usize {
        self.unflushed.lock().await.len()
    }

    /// Process one action. On a store failure the pre-pass row is written back
    /// unless the post already went out, in which case the posted row is kept.
    async fn run_action(&self, action: Action, config: &ActionsConfig) {
        // The stored row is stale until the held copy is written.
        if self.unflushed.lock().await.contains_key(&action.id) {
            debug!(action_id = %action.id, "skipping action with unwritten state");
            return;
        }
        let original = action.clone();
        let mut working = action;
        if let Err(e) = self.process(&mut working, config).await {
            let reason = if e.is_persistence() { "persistence failure" } else { "pipeline aborted" };
            error!(
                action_id = %working.id,
                account_id = %working.account_id,
                status = %working.status,
                error = %e,
                "{reason}, action will be picked up next tick"
            );
            let target = if working.posted_id.is_empty() { original } else { working };
            self.persist_or_hold(target).await;
        }
    }

    /// Write `action`, holding it for the next pass if the store is still failing.
    async fn persist_or_hold(&self, action: Action) {
        match self.store.update(&action).await {
            Ok(()) => {
                if action.status == ActionStatus::Completed {
                    info!(
                        action_id = %action.id,
                        account_id = %action.account_id,
                        posted_id = %action.posted_id,
                        "action completed"
                    );
                    self.event_bus.publish(ActionEvent::Completed(action));
                }
            }
            Err(e) => {
                error!(action_id = %action.id, status = %action.status, error = %e, "write failed, holding for next pass");
                self.unflushed.lock().await.insert(action.id.clone(), action);
            }
        }
    }

    async fn flush_unflushed(&self) {
        let held: Vec<Action> = self.unflushed.lock().await.drain().map(|(_, a)| a).collect();
        for action in held {
            self.persist_or_hold(action).await;
        }
    }

    async fn advance(&self, action: &mut Action, status: ActionStatus) -> Result<()> {
        action.status = status;
        action.updated_at = Utc::now();
        self.store.update(action).await?;
        debug!(action_id = %action.id, status = %status, "stage");
        Ok(())
    }

    /// Stage pipeline. `Err` only for persistence failures; business failures are recorded on the action.
    async fn process(&self, action: &mut Action, config: &ActionsConfig) -> Result<()> {
        action.next_retry_at = None;

        if action.final_text.trim().is_empty() {
            let ctx = self.build_context(action, config).await?;

            self.advance(action, ActionStatus::Generating).await?;
            self.event_bus.publish(ActionEvent::Generating(action.clone()));

            let (draft, tokens) = match self.generator.generate_draft(&ctx).await {
                Ok(d) => d,
                Err(e) => return self.record_failure(action, config, e).await,
            };
            action.draft_text = draft;
            action.tokens_used += tokens;

            let mut reviewed = None;
            if ContentGenerator::should_review(&ctx) {
                self.advance(action, ActionStatus::Reviewing).await?;
                match self.generator.review_and_refine(&action.draft_text, &ctx).await {
                    Ok((text, tokens)) => {
                        action.tokens_used += tokens;
                        reviewed = Some(text);
                    }
                    Err(e) => warn!(action_id = %action.id, error = %e, "review failed, using draft"),
                }
            }
            action.reviewed_text = reviewed.clone().unwrap_or_default();
            action.final_text = finalize(&action.draft_text, reviewed.as_deref(), config.max_length);
        } else {
            debug!(action_id = %action.id, "reusing generated text");
        }

        let image = self.screenshot(action, config).await?;
        self.post(action, config, image).await
    }

    async fn build_context(&self, action: &mut Action, config: &ActionsConfig) -> Result<GenerationContext> {
        self.advance(action, ActionStatus::Fetching).await?;

        let (mut market, mut profile) = (None, None);
        if let Some(fetcher) = &self.fetcher {
            if let Some(trade) = &action.trade_event {
                match fetcher.market_context(&trade.market_slug).await {
                    Ok(ctx) => market = ctx,
                    Err(e) => warn!(action_id = %action.id, error = %e, "market context fetch failed"),
                }
            }
            match fetcher.profile_context(&action.wallet_address).await {
                Ok(ctx) => profile = ctx,
                Err(e) => warn!(action_id = %action.id, error = %e, "profile context fetch failed"),
            }
        }

        let historical = if config.use_historical {
            self.store
                .recent_posts(&action.account_id, DRAFT_HISTORICAL_EXAMPLES as i64)
                .await?
        } else {
            Vec::new()
        };

        Ok(GenerationContext::new(action, config, historical).with_fetched(market, profile))
    }

    /// Optional capture. Failures leave the action without an image.
    async fn screenshot(&self, action: &mut Action, config: &ActionsConfig) -> Result<Option<PathBuf>> {
        let Some(capturer) = &self.capturer else { return Ok(None) };
        if config.screenshot_mode == ScreenshotMode::None {
            return Ok(None);
        }

        if !action.screenshot_path.is_empty() {
            let existing = PathBuf::from(&action.screenshot_path);
            if tokio::fs::try_exists(&existing).await.unwrap_or(false) {
                return Ok(Some(existing));
            }
        }

        self.advance(action, ActionStatus::Capturing).await?;
        let identifier = match config.screenshot_mode {
            ScreenshotMode::Market => action
                .trade_event
                .as_ref()
                .map(|t| t.market_slug.clone())
                .unwrap_or_default(),
            _ => action.wallet_address.clone(),
        };

        match capturer.capture(config.screenshot_mode, &identifier).await {
            Ok(path) => {
                action.screenshot_path = path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(path)
            }
            Err(e) => {
                warn!(action_id = %action.id, error = %e, "screenshot failed, posting without image");
                action.screenshot_path.clear();
                Ok(None)
            }
        }
    }

    async fn post(&self, action: &mut Action, config: &ActionsConfig, image: Option<PathBuf>) -> Result<()> {
        self.advance(action, ActionStatus::Posting).await?;
        self.event_bus.publish(ActionEvent::Posting(action.clone()));

        let publish = self.poster.publish(&action.account_id, &action.final_text, image.as_deref());
        let result = match tokio::time::timeout(self.post_timeout, publish).await {
            Ok(r) => r,
            Err(_) => Err(ActionError::Posting(format!(
                "timed out after {}s",
                self.post_timeout.as_secs()
            ))),
        };

        match result {
            Ok(posted_id) => {
                let now = Utc::now();
                action.posted_id = posted_id;
                action.status = ActionStatus::Completed;
                action.error_message.clear();
                action.next_retry_at = None;
                action.updated_at = now;
                action.processed_at = Some(now);
                self.store.update(action).await?;
                info!(
                    action_id = %action.id,
                    account_id = %action.account_id,
                    posted_id = %action.posted_id,
                    tokens_used = action.tokens_used,
                    "action completed"
                );
                self.event_bus.publish(ActionEvent::Completed(action.clone()));
                Ok(())
            }
            Err(e) => {
                let e = if e.is_retryable() { e } else { ActionError::Posting(e.to_string()) };
                self.record_failure(action, config, e).await
            }
        }
    }

    /// Count a failure and schedule the next attempt, or give up at the ceiling.
    async fn record_failure(&self, action: &mut Action, config: &ActionsConfig, err: ActionError) -> Result<()> {
        action.retry_count += 1;
        if action.retry_count >= action.max_retries {
            let exhausted = ActionError::ExhaustedRetries {
                retry_count: action.retry_count,
                last_error: err.to_string(),
            };
            return self.fail_terminally(action, exhausted.to_string()).await;
        }

        let now = Utc::now();
        let delay = backoff_delay(config.retry_backoff_secs, action.retry_count);
        action.status = ActionStatus::Failed;
        action.error_message = err.to_string();
        action.next_retry_at = Some(after(now, delay));
        action.updated_at = now;
        self.store.update(action).await?;
        warn!(
            action_id = %action.id,
            account_id = %action.account_id,
            retry_count = action.retry_count,
            delay_secs = delay.as_secs(),
            error = %err,
            "action failed, retry scheduled"
        );
        Ok(())
    }

    async fn fail_terminally(&self, action: &mut Action, message: String) -> Result<()> {
        let now = Utc::now();
        action.status = ActionStatus::Failed;
        action.error_message = message;
        action.next_retry_at = None;
        action.updated_at = now;
        action.processed_at = Some(now);
        self.store.update(action).await?;
        error!(
            action_id = %action.id,
            account_id = %action.account_id,
            retry_count = action.retry_count,
            error = %action.error_message,
            "action failed permanently"
        );
        self.event_bus.publish(ActionEvent::Failed(action.clone()));
        Ok(())
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
