// SQLite TaskRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use dispatch_core::domain::{DelegateTask, TaskId, TaskStatus};
use dispatch_core::error::Result;
use dispatch_core::port::TaskRepository;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::warn;

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert(&self, task: &DelegateTask) -> Result<()> {
        let tried = serde_json::to_string(&task.already_tried_delegates)?;
        let abstractions = serde_json::to_string(&task.setup_abstractions)?;

        sqlx::query(
            r#"
            INSERT INTO delegate_tasks (
                id, account_id, version, is_async, status,
                broadcast_count, already_tried_delegates, pre_assigned_delegate_id,
                setup_abstractions, next_broadcast, last_broadcast_at, expiry, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.account_id)
        .bind(&task.version)
        .bind(if task.is_async { 1 } else { 0 })
        .bind(task.status.to_string())
        .bind(task.broadcast_count)
        .bind(&tried)
        .bind(&task.pre_assigned_delegate_id)
        .bind(&abstractions)
        .bind(task.next_broadcast)
        .bind(task.last_broadcast_at)
        .bind(task.expiry)
        .bind(task.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<DelegateTask>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM delegate_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(TaskRow::into_task).transpose()
    }

    async fn find_due_for_broadcast(&self, now: i64, limit: usize) -> Result<Vec<DelegateTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"
            SELECT * FROM delegate_tasks
            WHERE status = 'QUEUED'
              AND next_broadcast <= ?
              AND expiry > ?
            ORDER BY next_broadcast ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn record_broadcast(
        &self,
        id: &TaskId,
        expected_count: i32,
        next_broadcast: i64,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE delegate_tasks
            SET broadcast_count = broadcast_count + 1,
                next_broadcast = ?,
                last_broadcast_at = ?
            WHERE id = ? AND broadcast_count = ? AND status = 'QUEUED'
            "#,
        )
        .bind(next_broadcast)
        .bind(now)
        .bind(id)
        .bind(expected_count)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_started(&self, id: &TaskId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE delegate_tasks SET status = 'STARTED' WHERE id = ? AND status = 'QUEUED'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_tried_delegates(&self, id: &TaskId, tried: &[String]) -> Result<bool> {
        let tried = serde_json::to_string(tried)?;

        let result = sqlx::query(
            r#"
            UPDATE delegate_tasks
            SET already_tried_delegates = ?
            WHERE id = ? AND status = 'QUEUED'
            "#,
        )
        .bind(&tried)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_by_status(&self, status: TaskStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM delegate_tasks WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    account_id: String,
    version: String,
    is_async: i32, // SQLite boolean as integer
    status: String,
    broadcast_count: i32,
    already_tried_delegates: String,
    pre_assigned_delegate_id: Option<String>,
    setup_abstractions: String,
    next_broadcast: i64,
    last_broadcast_at: Option<i64>,
    expiry: i64,
    created_at: i64,
}

impl TaskRow {
    fn into_task(self) -> Result<DelegateTask> {
        let status: TaskStatus = self.status.parse()?;

        let already_tried_delegates: Vec<String> =
            serde_json::from_str(&self.already_tried_delegates).unwrap_or_else(|e| {
                warn!(task_id = %self.id, error = %e, "Corrupt already_tried_delegates column");
                Vec::new()
            });
        let setup_abstractions: HashMap<String, String> =
            serde_json::from_str(&self.setup_abstractions).unwrap_or_else(|e| {
                warn!(task_id = %self.id, error = %e, "Corrupt setup_abstractions column");
                HashMap::new()
            });

        Ok(DelegateTask {
            id: self.id,
            account_id: self.account_id,
            version: self.version,
            is_async: self.is_async != 0,
            status,
            broadcast_count: self.broadcast_count,
            already_tried_delegates,
            pre_assigned_delegate_id: self.pre_assigned_delegate_id,
            setup_abstractions,
            next_broadcast: self.next_broadcast,
            last_broadcast_at: self.last_broadcast_at,
            expiry: self.expiry,
            created_at: self.created_at,
        })
    }
}
