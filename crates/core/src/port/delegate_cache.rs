// Delegate Cache Port - read-side lookup of delegate identity

use crate::domain::Delegate;
use crate::error::Result;
use async_trait::async_trait;

/// Cached delegate lookup
///
/// Entries are refreshed by the implementation's own expiry policy;
/// `force_refresh` bypasses the cached value.
#[async_trait]
pub trait DelegateCache: Send + Sync {
    /// Resolve a delegate, `None` if it no longer exists
    async fn get(
        &self,
        account_id: &str,
        delegate_id: &str,
        force_refresh: bool,
    ) -> Result<Option<Delegate>>;

    /// Drop a cached entry
    async fn invalidate(&self, account_id: &str, delegate_id: &str);
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fixed delegate set
    #[derive(Default)]
    pub struct MockDelegateCache {
        delegates: Mutex<HashMap<(String, String), Delegate>>,
    }

    impl MockDelegateCache {
        pub fn new(delegates: Vec<Delegate>) -> Self {
            let cache = Self::default();
            for d in delegates {
                cache.put(d);
            }
            cache
        }

        pub fn put(&self, delegate: Delegate) {
            self.delegates
                .lock()
                .unwrap()
                .insert((delegate.account_id.clone(), delegate.id.clone()), delegate);
        }
    }

    #[async_trait]
    impl DelegateCache for MockDelegateCache {
        async fn get(
            &self,
            account_id: &str,
            delegate_id: &str,
            _force_refresh: bool,
        ) -> Result<Option<Delegate>> {
            Ok(self
                .delegates
                .lock()
                .unwrap()
                .get(&(account_id.to_string(), delegate_id.to_string()))
                .cloned())
        }

        async fn invalidate(&self, _account_id: &str, _delegate_id: &str) {}
    }
}
