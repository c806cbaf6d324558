// Delegate Task Domain Model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::error::DomainError;

/// Task ID (UUID v4)
pub type TaskId = String;

/// Owning account identifier
pub type AccountId = String;

/// Setup abstraction key marking a task as belonging to the NG namespace
pub const NG_SETUP_ABSTRACTION: &str = "ng";

/// Task Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Started,
    Success,
    Failed,
    Aborted,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "QUEUED"),
            TaskStatus::Started => write!(f, "STARTED"),
            TaskStatus::Success => write!(f, "SUCCESS"),
            TaskStatus::Failed => write!(f, "FAILED"),
            TaskStatus::Aborted => write!(f, "ABORTED"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(TaskStatus::Queued),
            "STARTED" => Ok(TaskStatus::Started),
            "SUCCESS" => Ok(TaskStatus::Success),
            "FAILED" => Ok(TaskStatus::Failed),
            "ABORTED" => Ok(TaskStatus::Aborted),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Unit of work dispatched to the delegate fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateTask {
    pub id: TaskId,
    pub account_id: AccountId,
    pub version: String,
    pub is_async: bool,

    pub status: TaskStatus,

    // Broadcast bookkeeping
    pub broadcast_count: i32,
    pub already_tried_delegates: Vec<String>,
    pub pre_assigned_delegate_id: Option<String>,
    pub setup_abstractions: HashMap<String, String>,

    pub next_broadcast: i64, // epoch ms
    pub last_broadcast_at: Option<i64>,
    pub expiry: i64,
    pub created_at: i64,
}

impl DelegateTask {
    /// Create a new queued task
    ///
    /// # Arguments
    ///
    /// * `id` - Unique task ID (injected, not generated)
    /// * `account_id` - Owning account
    /// * `version` - Protocol version the task was created for
    /// * `is_async` - Fire-and-forget task (false = a caller is blocked on it)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        version: impl Into<String>,
        is_async: bool,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            version: version.into(),
            is_async,
            status: TaskStatus::Queued,
            broadcast_count: 0,
            already_tried_delegates: Vec::new(),
            pre_assigned_delegate_id: None,
            setup_abstractions: HashMap::new(),
            next_broadcast: created_at,
            last_broadcast_at: None,
            expiry: i64::MAX,
            created_at,
        }
    }

    /// NG namespace flag, read from the `ng` setup abstraction.
    /// Absent or unparsable values mean legacy.
    pub fn is_ng(&self) -> bool {
        self.setup_abstractions
            .get(NG_SETUP_ABSTRACTION)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Remember a delegate that was offered this task and did not claim it
    pub fn mark_tried(&mut self, delegate_id: impl Into<String>) {
        let delegate_id = delegate_id.into();
        if !self.already_tried_delegates.contains(&delegate_id) {
            self.already_tried_delegates.push(delegate_id);
        }
    }

    /// Advance bookkeeping after a broadcast attempt
    pub fn advance_broadcast(&mut self, now_millis: i64, next_broadcast: i64) {
        self.broadcast_count += 1;
        self.last_broadcast_at = Some(now_millis);
        self.next_broadcast = next_broadcast;
    }

    /// Transition from Queued to Started once a delegate claims the task
    pub fn start(&mut self) -> crate::domain::error::Result<()> {
        if self.status != TaskStatus::Queued {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: TaskStatus::Started.to_string(),
            });
        }
        self.status = TaskStatus::Started;
        Ok(())
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.expiry
    }

    /// Whether `delegate_id` may claim the task
    pub fn accepts(&self, delegate_id: &str) -> bool {
        match &self.pre_assigned_delegate_id {
            Some(assigned) => assigned == delegate_id,
            None => true,
        }
    }
}
