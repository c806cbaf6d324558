// Connection Repository Port (heartbeat records)

use crate::domain::{ConnectionId, DelegateConnection};
use crate::error::Result;
use async_trait::async_trait;

/// Keyset position inside the stale-record scan, ordered by
/// `(last_heartbeat, id)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleCursor {
    pub last_heartbeat: i64,
    pub id: ConnectionId,
}

impl StaleCursor {
    pub fn after(conn: &DelegateConnection) -> Self {
        Self {
            last_heartbeat: conn.last_heartbeat,
            id: conn.id.clone(),
        }
    }
}

/// Repository interface for delegate connection records
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// Insert or refresh a connection record
    async fn upsert(&self, conn: &DelegateConnection) -> Result<()>;

    /// Find connection by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<DelegateConnection>>;

    /// Records with `disconnected = false` and `last_heartbeat <= cutoff`,
    /// strictly after `after` in `(last_heartbeat, id)` order
    async fn find_stale(
        &self,
        cutoff: i64,
        after: Option<&StaleCursor>,
        limit: usize,
    ) -> Result<Vec<DelegateConnection>>;

    /// Whether a live record newer than `cutoff` exists for the delegate at `version`
    async fn exists_fresh(
        &self,
        account_id: &str,
        delegate_id: &str,
        version: &str,
        cutoff: i64,
    ) -> Result<bool>;

    /// Delete a record while its `last_heartbeat` is still `<= cutoff`.
    ///
    /// # Returns
    /// false if the record is gone or was refreshed since it was read
    async fn delete_if_stale(&self, id: &str, cutoff: i64) -> Result<bool>;

    /// Number of live records newer than `cutoff`
    async fn count_live(&self, cutoff: i64) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// BTreeMap-backed connection store that records deletions
    #[derive(Default)]
    pub struct InMemoryConnectionRepository {
        records: Mutex<BTreeMap<ConnectionId, DelegateConnection>>,
        deleted: Mutex<Vec<ConnectionId>>,
        fail_queries: Mutex<bool>,
    }

    impl InMemoryConnectionRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_records(records: Vec<DelegateConnection>) -> Self {
            let repo = Self::new();
            {
                let mut map = repo.records.lock().unwrap();
                for r in records {
                    map.insert(r.id.clone(), r);
                }
            }
            repo
        }

        pub fn contains(&self, id: &str) -> bool {
            self.records.lock().unwrap().contains_key(id)
        }

        pub fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        pub fn deleted(&self) -> Vec<ConnectionId> {
            self.deleted.lock().unwrap().clone()
        }

        pub fn set_fail_queries(&self, fail: bool) {
            *self.fail_queries.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl ConnectionRepository for InMemoryConnectionRepository {
        async fn upsert(&self, conn: &DelegateConnection) -> Result<()> {
            self.records
                .lock()
                .unwrap()
                .insert(conn.id.clone(), conn.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<DelegateConnection>> {
            Ok(self.records.lock().unwrap().get(id).cloned())
        }

        async fn find_stale(
            &self,
            cutoff: i64,
            after: Option<&StaleCursor>,
            limit: usize,
        ) -> Result<Vec<DelegateConnection>> {
            if *self.fail_queries.lock().unwrap() {
                return Err(crate::error::AppError::Database(
                    "connection store unavailable".to_string(),
                ));
            }

            let mut stale: Vec<DelegateConnection> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|c| c.is_stale(cutoff))
                .filter(|c| match after {
                    Some(cur) => (c.last_heartbeat, &c.id) > (cur.last_heartbeat, &cur.id),
                    None => true,
                })
                .cloned()
                .collect();
            stale.sort_by(|a, b| (a.last_heartbeat, &a.id).cmp(&(b.last_heartbeat, &b.id)));
            stale.truncate(limit);
            Ok(stale)
        }

        async fn exists_fresh(
            &self,
            account_id: &str,
            delegate_id: &str,
            version: &str,
            cutoff: i64,
        ) -> Result<bool> {
            Ok(self.records.lock().unwrap().values().any(|c| {
                c.account_id == account_id
                    && c.delegate_id == delegate_id
                    && c.version == version
                    && !c.disconnected
                    && c.last_heartbeat > cutoff
            }))
        }

        async fn delete_if_stale(&self, id: &str, cutoff: i64) -> Result<bool> {
            let mut records = self.records.lock().unwrap();
            match records.get(id) {
                Some(c) if c.last_heartbeat <= cutoff => {
                    records.remove(id);
                    self.deleted.lock().unwrap().push(id.to_string());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn count_live(&self, cutoff: i64) -> Result<i64> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|c| !c.disconnected && c.last_heartbeat > cutoff)
                .count() as i64)
        }
    }
}
