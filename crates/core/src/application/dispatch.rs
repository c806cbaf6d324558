// Task submission use case

use crate::application::broadcast::BroadcastHelper;
use crate::application::constants::{DEFAULT_TASK_TIMEOUT_MS, MAX_TASK_TIMEOUT_MS};
use crate::domain::{DelegateTask, TaskStatus};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TaskRepository, TimeProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const MAX_ID_LENGTH: usize = 128;

/// Submit request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub account_id: String,
    pub version: String,

    #[serde(default)]
    pub is_async: bool,

    #[serde(default)]
    pub pre_assigned_delegate_id: Option<String>,

    #[serde(default)]
    pub setup_abstractions: HashMap<String, String>,

    /// Milliseconds until the task expires (default: 1 hour, max: 7 days)
    #[serde(default)]
    pub timeout_ms: Option<i64>,
}

pub(crate) fn validate_request(req: &SubmitTaskRequest) -> Result<()> {
    validate_id("account_id", &req.account_id)?;
    validate_id("version", &req.version)?;
    if let Some(delegate_id) = &req.pre_assigned_delegate_id {
        validate_id("pre_assigned_delegate_id", delegate_id)?;
    }
    if let Some(timeout) = req.timeout_ms {
        if timeout <= 0 {
            return Err(AppError::Validation(format!(
                "timeout_ms must be positive, got {}",
                timeout
            )));
        }
        if timeout > MAX_TASK_TIMEOUT_MS {
            return Err(AppError::Validation(format!(
                "timeout_ms too large (max {}), got {}",
                MAX_TASK_TIMEOUT_MS, timeout
            )));
        }
    }
    Ok(())
}

pub(crate) fn validate_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(AppError::Validation(format!(
            "{} too long (max {} characters)",
            field, MAX_ID_LENGTH
        )));
    }
    Ok(())
}

/// Accepts new delegate tasks and announces them to the fleet
pub struct TaskDispatchService {
    task_repo: Arc<dyn TaskRepository>,
    broadcast_helper: BroadcastHelper,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl TaskDispatchService {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        broadcast_helper: BroadcastHelper,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            task_repo,
            broadcast_helper,
            id_provider,
            time_provider,
        }
    }

    /// Persist a queued task and broadcast it in the background
    ///
    /// The first rebroadcast is scheduled one backoff step out; the initial
    /// announcement happens immediately and does not count as an attempt.
    pub async fn submit(&self, req: SubmitTaskRequest) -> Result<DelegateTask> {
        validate_request(&req)?;

        let now = self.time_provider.now_millis();
        let mut task = DelegateTask::new(
            self.id_provider.generate_id(),
            req.account_id,
            req.version,
            req.is_async,
            now,
        );
        task.pre_assigned_delegate_id = req.pre_assigned_delegate_id;
        task.setup_abstractions = req.setup_abstractions;
        task.expiry = now.saturating_add(req.timeout_ms.unwrap_or(DEFAULT_TASK_TIMEOUT_MS));
        task.next_broadcast = self.broadcast_helper.compute_next_broadcast_time(&task);

        self.task_repo.insert(&task).await?;

        info!(
            task_id = %task.id,
            account_id = %task.account_id,
            is_async = task.is_async,
            next_broadcast = task.next_broadcast,
            "Delegate task queued"
        );

        self.broadcast_helper.broadcast_new_task_async(task.clone());
        Ok(task)
    }

    /// Hand a queued task to the delegate that picked it up.
    ///
    /// Once started the task drops out of the rebroadcast loop. Only one
    /// delegate wins when several claim concurrently.
    pub async fn claim(&self, task_id: &str, delegate_id: &str) -> Result<DelegateTask> {
        validate_id("delegate_id", delegate_id)?;
        let mut task = self.load(task_id).await?;

        if task.is_expired(self.time_provider.now_millis()) {
            return Err(AppError::Validation(format!("task {} has expired", task.id)));
        }
        if !task.accepts(delegate_id) {
            return Err(AppError::Validation(format!(
                "task {} is pre-assigned to another delegate",
                task.id
            )));
        }

        task.start()?;
        if !self.task_repo.mark_started(&task.id).await? {
            return Err(AppError::Validation(format!(
                "task {} was claimed by another delegate",
                task.id
            )));
        }

        info!(
            task_id = %task.id,
            account_id = %task.account_id,
            delegate_id = %delegate_id,
            broadcast_count = task.broadcast_count,
            "Delegate task claimed"
        );
        Ok(task)
    }

    /// Record that a delegate was offered the task and passed on it.
    ///
    /// Later announcements carry the delegate in `already_tried_delegates`.
    pub async fn decline(&self, task_id: &str, delegate_id: &str) -> Result<DelegateTask> {
        validate_id("delegate_id", delegate_id)?;
        let mut task = self.load(task_id).await?;

        if task.status != TaskStatus::Queued {
            return Err(AppError::Validation(format!(
                "task {} is {}, not QUEUED",
                task.id, task.status
            )));
        }

        task.mark_tried(delegate_id);
        if !self
            .task_repo
            .update_tried_delegates(&task.id, &task.already_tried_delegates)
            .await?
        {
            return Err(AppError::Validation(format!(
                "task {} is no longer queued",
                task.id
            )));
        }

        debug!(
            task_id = %task.id,
            delegate_id = %delegate_id,
            tried = task.already_tried_delegates.len(),
            "Delegate declined task"
        );
        Ok(task)
    }

    async fn load(&self, task_id: &str) -> Result<DelegateTask> {
        self.task_repo
            .find_by_id(&task_id.to_string())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task {}", task_id)))
    }
}
