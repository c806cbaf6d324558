// Feature Flag Port

use async_trait::async_trait;
use std::str::FromStr;

/// Feature flags consulted by the dispatch core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureName {
    /// Tasks are matched to delegates by capability instead of broadcast
    PerAgentCapabilities,
}

impl FeatureName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureName::PerAgentCapabilities => "PER_AGENT_CAPABILITIES",
        }
    }
}

impl std::fmt::Display for FeatureName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PER_AGENT_CAPABILITIES" => Ok(FeatureName::PerAgentCapabilities),
            other => Err(format!("unknown feature flag: {}", other)),
        }
    }
}

/// Per-account feature flag lookup
#[async_trait]
pub trait FeatureFlagService: Send + Sync {
    async fn is_enabled(&self, flag: FeatureName, account_id: &str) -> bool;
}

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Flags enabled for explicit (flag, account) pairs
    #[derive(Default)]
    pub struct MockFeatureFlags {
        enabled: Mutex<HashSet<(FeatureName, String)>>,
    }

    impl MockFeatureFlags {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn enable(&self, flag: FeatureName, account_id: impl Into<String>) {
            self.enabled
                .lock()
                .unwrap()
                .insert((flag, account_id.into()));
        }
    }

    #[async_trait]
    impl FeatureFlagService for MockFeatureFlags {
        async fn is_enabled(&self, flag: FeatureName, account_id: &str) -> bool {
            self.enabled
                .lock()
                .unwrap()
                .contains(&(flag, account_id.to_string()))
        }
    }
}
