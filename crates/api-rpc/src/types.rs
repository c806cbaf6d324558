//! RPC Request/Response Types

use serde::{Deserialize, Serialize};

/// task.submit.v1 params are `dispatch_core::application::SubmitTaskRequest`
#[derive(Debug, Clone, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
    pub status: String,
    /// Channel the task is announced on
    pub channel: String,
    pub next_broadcast: i64,
    pub expiry: i64,
}

/// task.claim.v1 / task.decline.v1 - A delegate's answer to an announcement
#[derive(Debug, Deserialize)]
pub struct TaskResponseRequest {
    pub task_id: String,
    pub delegate_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStateResponse {
    pub task_id: String,
    pub status: String,
    pub already_tried_delegates: Vec<String>,
}

/// delegate.register.v1 - Register or update a delegate
#[derive(Debug, Deserialize)]
pub struct RegisterDelegateRequest {
    pub account_id: String,
    pub delegate_id: String,
    pub version: String,
    #[serde(default)]
    pub polling_mode: bool,
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterDelegateResponse {
    pub delegate_id: String,
    pub registered: bool,
}

/// delegate.heartbeat.v1 params are `dispatch_core::application::HeartbeatRequest`
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub connection_id: String,
    pub last_heartbeat: i64,
}

/// admin.sweep.v1 - Run one disconnection sweep now
#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    /// false when this node is not primary and nothing was scanned
    pub primary: bool,
    pub scanned: usize,
    pub notified: usize,
    pub removed: usize,
    /// Refreshed by a heartbeat while the sweep ran
    pub skipped: usize,
    pub failed: usize,
}

/// admin.stats.v1 - Get system statistics
#[derive(Debug, Default, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub queued_tasks: i64,
    pub started_tasks: i64,
    pub live_connections: i64,
    pub uptime_seconds: i64,
}
