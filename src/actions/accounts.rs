//! Read-only access to per-account action settings.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::types::ActionsConfig;
use crate::error::Result;

/// Snapshot of every account's settings, ordered by account id.
pub type ConfigSnapshot = BTreeMap<String, ActionsConfig>;

/// Source of `ActionsConfig`. The pipeline never mutates it.
#[async_trait]
pub trait AccountConfigs: Send + Sync {
    /// Settings for every known account, taken once per pass.
    async fn snapshot(&self) -> Result<ConfigSnapshot>;

    async fn get(&self, account_id: &str) -> Result<Option<ActionsConfig>> {
        Ok(self.snapshot().await?.remove(account_id))
    }
}

/// Accounts declared in the `[accounts.*]` config tables.
pub struct StaticAccountConfigs {
    accounts: ConfigSnapshot,
}

impl StaticAccountConfigs {
    pub fn new(accounts: impl IntoIterator<Item = (String, ActionsConfig)>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountConfigs for StaticAccountConfigs {
    async fn snapshot(&self) -> Result<ConfigSnapshot> {
        Ok(self.accounts.clone())
    }

    async fn get(&self, account_id: &str) -> Result<Option<ActionsConfig>> {
        Ok(self.accounts.get(account_id).cloned())
    }
}
