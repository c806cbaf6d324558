// SQLite DelegateRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use dispatch_core::domain::Delegate;
use dispatch_core::error::Result;
use dispatch_core::port::DelegateRepository;
use sqlx::SqlitePool;

pub struct SqliteDelegateRepository {
    pool: SqlitePool,
}

impl SqliteDelegateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DelegateRepository for SqliteDelegateRepository {
    async fn upsert(&self, delegate: &Delegate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delegates (account_id, delegate_id, version, polling_mode, hostname)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(account_id, delegate_id) DO UPDATE SET
                version = excluded.version,
                polling_mode = excluded.polling_mode,
                hostname = excluded.hostname
            "#,
        )
        .bind(&delegate.account_id)
        .bind(&delegate.id)
        .bind(&delegate.version)
        .bind(if delegate.polling_mode { 1 } else { 0 })
        .bind(&delegate.hostname)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find(&self, account_id: &str, delegate_id: &str) -> Result<Option<Delegate>> {
        let row = sqlx::query_as::<_, DelegateRow>(
            "SELECT * FROM delegates WHERE account_id = ? AND delegate_id = ?",
        )
        .bind(account_id)
        .bind(delegate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|r| Delegate {
            id: r.delegate_id,
            account_id: r.account_id,
            version: r.version,
            polling_mode: r.polling_mode != 0,
            hostname: r.hostname,
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DelegateRow {
    account_id: String,
    delegate_id: String,
    version: String,
    polling_mode: i32,
    hostname: Option<String>,
}
