// SQLite-backed primary election
//
// A single row per lease name. A holder renews by rewriting its own row; any
// process may take over once `expires_at` has passed.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use dispatch_core::error::Result;
use dispatch_core::port::{LeaderElection, TimeProvider};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_LEASE_NAME: &str = "dispatch-primary";

pub struct SqliteLeaderLease {
    pool: SqlitePool,
    lease_name: String,
    holder_id: String,
    lease: Duration,
    time_provider: Arc<dyn TimeProvider>,
    was_primary: AtomicBool,
}

impl SqliteLeaderLease {
    pub fn new(
        pool: SqlitePool,
        holder_id: impl Into<String>,
        lease: Duration,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            lease_name: DEFAULT_LEASE_NAME.to_string(),
            holder_id: holder_id.into(),
            lease,
            time_provider,
            was_primary: AtomicBool::new(false),
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Acquire or renew the lease
    ///
    /// # Returns
    /// true if this holder owns the lease after the call
    pub async fn try_acquire(&self) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let expires_at = now + self.lease.as_millis() as i64;

        let result = sqlx::query(
            r#"
            INSERT INTO leader_lease (name, holder, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                holder = excluded.holder,
                expires_at = excluded.expires_at
            WHERE leader_lease.holder = excluded.holder
               OR leader_lease.expires_at <= ?
            "#,
        )
        .bind(&self.lease_name)
        .bind(&self.holder_id)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    /// Give up the lease if held (graceful shutdown)
    pub async fn release(&self) -> Result<()> {
        sqlx::query("DELETE FROM leader_lease WHERE name = ? AND holder = ?")
            .bind(&self.lease_name)
            .bind(&self.holder_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        self.was_primary.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LeaderElection for SqliteLeaderLease {
    async fn is_primary(&self) -> bool {
        let primary = match self.try_acquire().await {
            Ok(held) => held,
            Err(e) => {
                warn!(holder = %self.holder_id, error = %e, "Leader lease check failed");
                false
            }
        };

        if self.was_primary.swap(primary, Ordering::SeqCst) != primary {
            if primary {
                info!(holder = %self.holder_id, "Acquired primary lease");
            } else {
                info!(holder = %self.holder_id, "Lost primary lease");
            }
        }

        primary
    }
}
