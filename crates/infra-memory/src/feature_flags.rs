// Feature flags parsed from static configuration
//
// Format: `FLAG=acct1,acct2;FLAG2=*` where `*` enables the flag for every account.

use async_trait::async_trait;
use dispatch_core::error::{AppError, Result};
use dispatch_core::port::{FeatureFlagService, FeatureName};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    AllAccounts,
    Accounts(HashSet<String>),
}

#[derive(Default)]
pub struct StaticFeatureFlags {
    flags: RwLock<HashMap<FeatureName, Scope>>,
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flag list; blank input enables nothing
    pub fn parse(raw: &str) -> Result<Self> {
        let flags = Self::new();

        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, accounts) = entry.split_once('=').ok_or_else(|| {
                AppError::Config(format!("feature flag entry '{}' is missing '='", entry))
            })?;
            let flag: FeatureName = name.parse().map_err(AppError::Config)?;

            let accounts: Vec<&str> = accounts
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .collect();
            if accounts.is_empty() {
                return Err(AppError::Config(format!(
                    "feature flag {} lists no accounts",
                    flag
                )));
            }

            for account in accounts {
                if account == "*" {
                    flags.enable_all(flag);
                } else {
                    flags.enable(flag, account);
                }
            }
        }

        Ok(flags)
    }

    pub fn enable(&self, flag: FeatureName, account_id: &str) {
        let mut flags = self.flags.write().unwrap();
        match flags
            .entry(flag)
            .or_insert_with(|| Scope::Accounts(HashSet::new()))
        {
            Scope::AllAccounts => {}
            Scope::Accounts(accounts) => {
                accounts.insert(account_id.to_string());
            }
        }
    }

    pub fn enable_all(&self, flag: FeatureName) {
        self.flags.write().unwrap().insert(flag, Scope::AllAccounts);
    }
}

#[async_trait]
impl FeatureFlagService for StaticFeatureFlags {
    async fn is_enabled(&self, flag: FeatureName, account_id: &str) -> bool {
        let enabled = match self.flags.read().unwrap().get(&flag) {
            Some(Scope::AllAccounts) => true,
            Some(Scope::Accounts(accounts)) => accounts.contains(account_id),
            None => false,
        };
        debug!(flag = %flag, account_id = %account_id, enabled, "Feature flag checked");
        enabled
    }
}
