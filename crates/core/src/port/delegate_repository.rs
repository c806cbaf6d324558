// Delegate Repository Port (Interface)

use crate::domain::Delegate;
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for registered delegates
#[async_trait]
pub trait DelegateRepository: Send + Sync {
    /// Insert or replace a delegate registration
    async fn upsert(&self, delegate: &Delegate) -> Result<()>;

    /// Find a delegate by (account, delegate id)
    async fn find(&self, account_id: &str, delegate_id: &str) -> Result<Option<Delegate>>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryDelegateRepository {
        delegates: Mutex<HashMap<(String, String), Delegate>>,
        lookups: Mutex<usize>,
    }

    impl InMemoryDelegateRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of `find` calls served
        pub fn lookup_count(&self) -> usize {
            *self.lookups.lock().unwrap()
        }
    }

    #[async_trait]
    impl DelegateRepository for InMemoryDelegateRepository {
        async fn upsert(&self, delegate: &Delegate) -> Result<()> {
            self.delegates.lock().unwrap().insert(
                (delegate.account_id.clone(), delegate.id.clone()),
                delegate.clone(),
            );
            Ok(())
        }

        async fn find(&self, account_id: &str, delegate_id: &str) -> Result<Option<Delegate>> {
            *self.lookups.lock().unwrap() += 1;
            Ok(self
                .delegates
                .lock()
                .unwrap()
                .get(&(account_id.to_string(), delegate_id.to_string()))
                .cloned())
        }
    }
}
