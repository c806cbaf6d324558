// TTL cache in front of the delegate repository

use async_trait::async_trait;
use dispatch_core::domain::Delegate;
use dispatch_core::error::Result;
use dispatch_core::port::{DelegateCache, DelegateRepository, TimeProvider};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
struct CacheEntry {
    delegate: Option<Delegate>,
    loaded_at: i64,
}

/// Caches lookups (including misses) for `ttl`.
/// Expired entries are dropped whenever a lookup goes to the repository.
pub struct CachedDelegateLookup {
    repo: Arc<dyn DelegateRepository>,
    time_provider: Arc<dyn TimeProvider>,
    ttl_ms: i64,
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
}

impl CachedDelegateLookup {
    pub fn new(
        repo: Arc<dyn DelegateRepository>,
        time_provider: Arc<dyn TimeProvider>,
        ttl: Duration,
    ) -> Self {
        Self {
            repo,
            time_provider,
            ttl_ms: ttl.as_millis() as i64,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DelegateCache for CachedDelegateLookup {
    async fn get(
        &self,
        account_id: &str,
        delegate_id: &str,
        force_refresh: bool,
    ) -> Result<Option<Delegate>> {
        let key = (account_id.to_string(), delegate_id.to_string());
        let now = self.time_provider.now_millis();

        if !force_refresh {
            if let Some(entry) = self.entries.read().await.get(&key) {
                if now - entry.loaded_at < self.ttl_ms {
                    return Ok(entry.delegate.clone());
                }
            }
        }

        let delegate = self.repo.find(account_id, delegate_id).await?;
        debug!(
            account_id = %account_id,
            delegate_id = %delegate_id,
            found = delegate.is_some(),
            force_refresh,
            "Delegate cache loaded"
        );

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| now - entry.loaded_at < self.ttl_ms);
        entries.insert(
            key,
            CacheEntry {
                delegate: delegate.clone(),
                loaded_at: now,
            },
        );
        Ok(delegate)
    }

    async fn invalidate(&self, account_id: &str, delegate_id: &str) {
        self.entries
            .write()
            .await
            .remove(&(account_id.to_string(), delegate_id.to_string()));
    }
}
