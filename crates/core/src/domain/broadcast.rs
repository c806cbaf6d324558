// Broadcast Record - pub/sub payload announcing a task to the delegate fleet

use serde::{Deserialize, Serialize};

use crate::domain::task::DelegateTask;

/// Prefix of the per-account delegate stream channel
pub const DELEGATE_STREAM_PREFIX: &str = "/stream/delegate/";

/// One re-announcement of a delegate task.
///
/// Built fresh for every broadcast and discarded after publishing; it has no
/// identity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateTaskBroadcast {
    pub version: String,
    pub account_id: String,
    pub task_id: String,
    pub is_async: bool,
    pub is_ng: bool,
    pub pre_assigned_delegate_id: Option<String>,
    pub already_tried_delegates: Vec<String>,
}

impl DelegateTaskBroadcast {
    pub fn from_task(task: &DelegateTask) -> Self {
        Self {
            version: task.version.clone(),
            account_id: task.account_id.clone(),
            task_id: task.id.clone(),
            is_async: task.is_async,
            is_ng: task.is_ng(),
            pre_assigned_delegate_id: task.pre_assigned_delegate_id.clone(),
            already_tried_delegates: task.already_tried_delegates.clone(),
        }
    }
}

/// Channel name for an account's delegate stream
pub fn delegate_stream_channel(account_id: &str) -> String {
    format!("{}{}", DELEGATE_STREAM_PREFIX, account_id)
}
