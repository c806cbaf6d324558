// Task Repository Port (Interface)

use crate::domain::{DelegateTask, TaskId, TaskStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for DelegateTask persistence
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task
    async fn insert(&self, task: &DelegateTask) -> Result<()>;

    /// Find task by ID
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<DelegateTask>>;

    /// Queued, unexpired tasks whose `next_broadcast` has elapsed,
    /// oldest due first
    async fn find_due_for_broadcast(&self, now: i64, limit: usize) -> Result<Vec<DelegateTask>>;

    /// Claim one broadcast attempt.
    ///
    /// Increments `broadcast_count` and sets `next_broadcast` / `last_broadcast_at`
    /// only if the stored count still equals `expected_count`.
    ///
    /// # Returns
    /// false if another process advanced the task first
    async fn record_broadcast(
        &self,
        id: &TaskId,
        expected_count: i32,
        next_broadcast: i64,
        now: i64,
    ) -> Result<bool>;

    /// Move a queued task to `STARTED`.
    ///
    /// # Returns
    /// false if the task is missing or no longer queued
    async fn mark_started(&self, id: &TaskId) -> Result<bool>;

    /// Replace the tried-delegate list of a queued task.
    ///
    /// # Returns
    /// false if the task is missing or no longer queued
    async fn update_tried_delegates(&self, id: &TaskId, tried: &[String]) -> Result<bool>;

    /// Count tasks by status
    async fn count_by_status(&self, status: TaskStatus) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// HashMap-backed task store
    #[derive(Default)]
    pub struct InMemoryTaskRepository {
        tasks: Mutex<HashMap<TaskId, DelegateTask>>,
    }

    impl InMemoryTaskRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get(&self, id: &str) -> Option<DelegateTask> {
            self.tasks.lock().unwrap().get(id).cloned()
        }

        /// Bump a stored task's count behind the caller's back (lost-claim tests)
        pub fn bump_broadcast_count(&self, id: &str) {
            if let Some(task) = self.tasks.lock().unwrap().get_mut(id) {
                task.broadcast_count += 1;
            }
        }
    }

    #[async_trait]
    impl TaskRepository for InMemoryTaskRepository {
        async fn insert(&self, task: &DelegateTask) -> Result<()> {
            self.tasks
                .lock()
                .unwrap()
                .insert(task.id.clone(), task.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &TaskId) -> Result<Option<DelegateTask>> {
            Ok(self.get(id))
        }

        async fn find_due_for_broadcast(
            &self,
            now: i64,
            limit: usize,
        ) -> Result<Vec<DelegateTask>> {
            let mut due: Vec<DelegateTask> = self
                .tasks
                .lock()
                .unwrap()
                .values()
                .filter(|t| {
                    t.status == TaskStatus::Queued && t.next_broadcast <= now && t.expiry > now
                })
                .cloned()
                .collect();
            due.sort_by(|a, b| (a.next_broadcast, &a.id).cmp(&(b.next_broadcast, &b.id)));
            due.truncate(limit);
            Ok(due)
        }

        async fn record_broadcast(
            &self,
            id: &TaskId,
            expected_count: i32,
            next_broadcast: i64,
            now: i64,
        ) -> Result<bool> {
            let mut tasks = self.tasks.lock().unwrap();
            match tasks.get_mut(id) {
                Some(task) if task.broadcast_count == expected_count => {
                    task.advance_broadcast(now, next_broadcast);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn mark_started(&self, id: &TaskId) -> Result<bool> {
            let mut tasks = self.tasks.lock().unwrap();
            match tasks.get_mut(id) {
                Some(task) if task.status == TaskStatus::Queued => {
                    task.status = TaskStatus::Started;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn update_tried_delegates(&self, id: &TaskId, tried: &[String]) -> Result<bool> {
            let mut tasks = self.tasks.lock().unwrap();
            match tasks.get_mut(id) {
                Some(task) if task.status == TaskStatus::Queued => {
                    task.already_tried_delegates = tried.to_vec();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn count_by_status(&self, status: TaskStatus) -> Result<i64> {
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .values()
                .filter(|t| t.status == status)
                .count() as i64)
        }
    }
}
