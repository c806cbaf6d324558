// SQLite ConnectionRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use dispatch_core::domain::DelegateConnection;
use dispatch_core::error::Result;
use dispatch_core::port::{ConnectionRepository, StaleCursor};
use sqlx::SqlitePool;

pub struct SqliteConnectionRepository {
    pool: SqlitePool,
}

impl SqliteConnectionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionRepository for SqliteConnectionRepository {
    async fn upsert(&self, conn: &DelegateConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delegate_connections (
                id, account_id, delegate_id, version, last_heartbeat, disconnected
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                last_heartbeat = excluded.last_heartbeat,
                disconnected = excluded.disconnected
            "#,
        )
        .bind(&conn.id)
        .bind(&conn.account_id)
        .bind(&conn.delegate_id)
        .bind(&conn.version)
        .bind(conn.last_heartbeat)
        .bind(if conn.disconnected { 1 } else { 0 })
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<DelegateConnection>> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            "SELECT * FROM delegate_connections WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ConnectionRow::into_connection))
    }

    async fn find_stale(
        &self,
        cutoff: i64,
        after: Option<&StaleCursor>,
        limit: usize,
    ) -> Result<Vec<DelegateConnection>> {
        // No cursor: start below every possible key
        let (after_heartbeat, after_id) = match after {
            Some(cursor) => (cursor.last_heartbeat, cursor.id.as_str()),
            None => (i64::MIN, ""),
        };

        let rows: Vec<ConnectionRow> = sqlx::query_as(
            r#"
            SELECT * FROM delegate_connections
            WHERE disconnected = 0
              AND last_heartbeat <= ?
              AND (last_heartbeat > ? OR (last_heartbeat = ? AND id > ?))
            ORDER BY last_heartbeat ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(cutoff)
        .bind(after_heartbeat)
        .bind(after_heartbeat)
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ConnectionRow::into_connection).collect())
    }

    async fn exists_fresh(
        &self,
        account_id: &str,
        delegate_id: &str,
        version: &str,
        cutoff: i64,
    ) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM delegate_connections
                WHERE account_id = ? AND delegate_id = ? AND version = ?
                  AND disconnected = 0
                  AND last_heartbeat > ?
            )
            "#,
        )
        .bind(account_id)
        .bind(delegate_id)
        .bind(version)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(exists != 0)
    }

    async fn delete_if_stale(&self, id: &str, cutoff: i64) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM delegate_connections WHERE id = ? AND last_heartbeat <= ?",
        )
        .bind(id)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_live(&self, cutoff: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM delegate_connections WHERE disconnected = 0 AND last_heartbeat > ?",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConnectionRow {
    id: String,
    account_id: String,
    delegate_id: String,
    version: String,
    last_heartbeat: i64,
    disconnected: i32, // SQLite boolean as integer
}

impl ConnectionRow {
    fn into_connection(self) -> DelegateConnection {
        DelegateConnection {
            id: self.id,
            account_id: self.account_id,
            delegate_id: self.delegate_id,
            version: self.version,
            last_heartbeat: self.last_heartbeat,
            disconnected: self.disconnected != 0,
        }
    }
}
