// Delegate registration and heartbeat ingestion

use crate::application::dispatch::validate_id;
use crate::domain::{Delegate, DelegateConnection};
use crate::error::{AppError, Result};
use crate::port::{ConnectionRepository, DelegateCache, DelegateRepository, IdProvider, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Heartbeat sent by a live delegate connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub account_id: String,
    pub delegate_id: String,
    pub version: String,

    /// Existing connection to refresh; a new record is created when absent
    #[serde(default)]
    pub connection_id: Option<String>,
}

/// Maintains delegate registrations and their connection records
pub struct ConnectionService {
    connection_repo: Arc<dyn ConnectionRepository>,
    delegate_repo: Arc<dyn DelegateRepository>,
    delegate_cache: Arc<dyn DelegateCache>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ConnectionService {
    pub fn new(
        connection_repo: Arc<dyn ConnectionRepository>,
        delegate_repo: Arc<dyn DelegateRepository>,
        delegate_cache: Arc<dyn DelegateCache>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            connection_repo,
            delegate_repo,
            delegate_cache,
            id_provider,
            time_provider,
        }
    }

    /// Register (or re-register) a delegate and drop its cached entry
    pub async fn register_delegate(&self, delegate: Delegate) -> Result<()> {
        validate_id("account_id", &delegate.account_id)?;
        validate_id("delegate_id", &delegate.id)?;
        validate_id("version", &delegate.version)?;

        self.delegate_repo.upsert(&delegate).await?;
        self.delegate_cache
            .invalidate(&delegate.account_id, &delegate.id)
            .await;

        info!(
            account_id = %delegate.account_id,
            delegate_id = %delegate.id,
            version = %delegate.version,
            polling_mode = delegate.polling_mode,
            "Delegate registered"
        );
        Ok(())
    }

    /// Refresh (or open) a connection record with `last_heartbeat = now`
    pub async fn record_heartbeat(&self, req: HeartbeatRequest) -> Result<DelegateConnection> {
        validate_id("account_id", &req.account_id)?;
        validate_id("delegate_id", &req.delegate_id)?;
        validate_id("version", &req.version)?;

        let connection_id = match req.connection_id {
            Some(id) => {
                if let Some(existing) = self.connection_repo.find_by_id(&id).await? {
                    if existing.account_id != req.account_id
                        || existing.delegate_id != req.delegate_id
                    {
                        return Err(AppError::Validation(format!(
                            "connection {} belongs to another delegate",
                            id
                        )));
                    }
                }
                id
            }
            None => self.id_provider.generate_id(),
        };

        let conn = DelegateConnection::new(
            connection_id,
            req.account_id,
            req.delegate_id,
            req.version,
            self.time_provider.now_millis(),
        );
        self.connection_repo.upsert(&conn).await?;

        debug!(
            connection_id = %conn.id,
            delegate_id = %conn.delegate_id,
            "Heartbeat recorded"
        );
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::connection_repository::mocks::InMemoryConnectionRepository;
    use crate::port::delegate_cache::mocks::MockDelegateCache;
    use crate::port::delegate_repository::mocks::InMemoryDelegateRepository;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    struct Fixture {
        service: ConnectionService,
        connections: Arc<InMemoryConnectionRepository>,
        delegates: Arc<InMemoryDelegateRepository>,
        clock: Arc<FixedTimeProvider>,
    }

    fn fixture() -> Fixture {
        let connections = Arc::new(InMemoryConnectionRepository::new());
        let delegates = Arc::new(InMemoryDelegateRepository::new());
        let clock = Arc::new(FixedTimeProvider::new(1_000));
        let service = ConnectionService::new(
            connections.clone(),
            delegates.clone(),
            Arc::new(MockDelegateCache::default()),
            Arc::new(SequentialIdProvider::new("conn")),
            clock.clone(),
        );
        Fixture {
            service,
            connections,
            delegates,
            clock,
        }
    }

    fn heartbeat(connection_id: Option<&str>) -> HeartbeatRequest {
        HeartbeatRequest {
            account_id: "acct-1".to_string(),
            delegate_id: "d-1".to_string(),
            version: "1".to_string(),
            connection_id: connection_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_first_heartbeat_opens_connection() {
        let f = fixture();

        let conn = f.service.record_heartbeat(heartbeat(None)).await.unwrap();

        assert_eq!(conn.id, "conn-1");
        assert_eq!(conn.last_heartbeat, 1_000);
        assert!(f.connections.contains("conn-1"));
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_existing_connection() {
        let f = fixture();
        f.service.record_heartbeat(heartbeat(None)).await.unwrap();
        f.clock.advance(30_000);

        let conn = f
            .service
            .record_heartbeat(heartbeat(Some("conn-1")))
            .await
            .unwrap();

        assert_eq!(conn.last_heartbeat, 31_000);
        assert_eq!(f.connections.len(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_for_foreign_connection_is_rejected() {
        let f = fixture();
        f.service.record_heartbeat(heartbeat(None)).await.unwrap();

        let mut req = heartbeat(Some("conn-1"));
        req.delegate_id = "d-2".to_string();

        assert!(matches!(
            f.service.record_heartbeat(req).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_register_delegate_persists() {
        let f = fixture();

        f.service
            .register_delegate(Delegate::new("d-1", "acct-1", "2", true))
            .await
            .unwrap();

        let stored = f.delegates.find("acct-1", "d-1").await.unwrap().unwrap();
        assert!(stored.polling_mode);
    }
}
