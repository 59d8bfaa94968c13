//! Decides whether an incoming signal spawns an action for an account.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::accounts::AccountConfigs;
use super::store::{ActionStore, CreateOutcome};
use super::types::{
    Action, ActionsConfig, MarketSignal, TriggerType, FRESH_INSIDER_MAX_BETS, FRESH_WALLET_MAX_BETS,
};
use crate::error::Result;
use crate::events::bus::{ActionEvent, EventBus};

/// What happened to a signal for one account.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Disabled,
    NoMatch,
    /// Already handled; the existing action is untouched.
    Duplicate { action_id: String },
    Queued { action: Action },
}

/// Per-account result of fanning a signal out.
#[derive(Debug, Clone, Serialize)]
pub struct AccountOutcome {
    pub account_id: String,
    #[serde(flatten)]
    pub outcome: Option<TriggerOutcome>,
    /// Set when evaluation failed for this account (store unavailable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pure matching rule. `enabled` is not consulted here.
pub fn matches(config: &ActionsConfig, signal: &MarketSignal) -> bool {
    let bets = signal.wallet.bet_count;
    match config.trigger_type {
        TriggerType::FreshInsider => bets <= FRESH_INSIDER_MAX_BETS,
        TriggerType::FreshWallet => bets <= FRESH_WALLET_MAX_BETS,
        TriggerType::BigTrade => signal
            .trade
            .as_ref()
            .is_some_and(|t| t.notional() >= config.min_trade_size),
        TriggerType::AnyTrade => signal.trade.is_some(),
        TriggerType::CustomBetCount => bets <= config.custom_bet_count,
    }
}

pub struct TriggerEvaluator {
    store: Arc<dyn ActionStore>,
    accounts: Arc<dyn AccountConfigs>,
    event_bus: Arc<EventBus>,
    polymarket_web_url: String,
}

impl TriggerEvaluator {
    pub fn new(
        store: Arc<dyn ActionStore>,
        accounts: Arc<dyn AccountConfigs>,
        event_bus: Arc<EventBus>,
        polymarket_web_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            accounts,
            event_bus,
            polymarket_web_url: polymarket_web_url.into(),
        }
    }

    pub fn polymarket_web_url(&self) -> &str {
        &self.polymarket_web_url
    }

    /// Evaluate one signal for one account, creating the action on a match.
    pub async fn evaluate(
        &self,
        account_id: &str,
        config: &ActionsConfig,
        signal: &MarketSignal,
    ) -> Result<TriggerOutcome> {
        if !config.enabled {
            return Ok(TriggerOutcome::Disabled);
        }
        if !matches(config, signal) {
            return Ok(TriggerOutcome::NoMatch);
        }

        // Ledger hit short-circuits; create_if_absent below still closes the race.
        if let Some(action_id) = self.store.find_by_event(account_id, &signal.event_id).await? {
            debug!(account_id, event_id = %signal.event_id, %action_id, "signal already handled");
            return Ok(TriggerOutcome::Duplicate { action_id });
        }

        let action = Action::from_signal(account_id, config, signal, &self.polymarket_web_url);
        match self.store.create_if_absent(&action).await? {
            CreateOutcome::Created => {
                info!(
                    account_id,
                    action_id = %action.id,
                    trigger = %action.trigger_type,
                    event_id = %signal.event_id,
                    "action queued"
                );
                self.event_bus.publish(ActionEvent::Queued(action.clone()));
                Ok(TriggerOutcome::Queued { action })
            }
            CreateOutcome::Duplicate { action_id } => {
                debug!(account_id, event_id = %signal.event_id, %action_id, "lost dedup race");
                Ok(TriggerOutcome::Duplicate { action_id })
            }
        }
    }

    /// Fan a signal out to every configured account.
    pub async fn handle_signal(&self, signal: &MarketSignal) -> Result<Vec<AccountOutcome>> {
        let snapshot = self.accounts.snapshot().await?;
        let mut outcomes = Vec::with_capacity(snapshot.len());
        for (account_id, config) in &snapshot {
            let result = self.evaluate(account_id, config, signal).await;
            let (outcome, error) = match result {
                Ok(o) => (Some(o), None),
                Err(e) => {
                    error!(account_id = %account_id, event_id = %signal.event_id, error = %e, "trigger evaluation failed");
                    (None, Some(e.to_string()))
                }
            };
            outcomes.push(AccountOutcome {
                account_id: account_id.clone(),
                outcome,
                error,
            });
        }
        Ok(outcomes)
    }
}
