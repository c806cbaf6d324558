//! Broadcast Scheduler - announces unclaimed delegate tasks to the fleet
//!
//! - `compute_next_broadcast_time`: backoff for the next re-announcement
//! - `rebroadcast_task`: publish a task to its account's delegate stream
//! - `broadcast_new_task_async`: fire-and-forget variant on the runtime

use crate::application::constants::{ASYNC_BROADCAST_DELAYS_SECS, SYNC_BROADCAST_DELAYS_SECS};
use crate::domain::broadcast::delegate_stream_channel;
use crate::domain::{DelegateTask, DelegateTaskBroadcast};
use crate::error::{AppError, Result};
use crate::port::{BroadcastTransport, FeatureFlagService, FeatureName, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Result of a single (re)broadcast request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// No task was given
    NoTask,
    /// Capability-based assignment owns this task, nothing was published
    CapabilityAssigned,
    /// Announcement published
    Published { channel: String, receivers: usize },
    /// Lookup or publish failed (logged, not propagated)
    Failed,
}

/// Backoff delay before the given attempt.
///
/// `next_attempt` indexes the async or sync delay table; values past the end
/// reuse the last entry and negative values are treated as 0.
pub fn next_broadcast_delay(next_attempt: i32, is_async: bool) -> Duration {
    let table: &[u64] = if is_async {
        &ASYNC_BROADCAST_DELAYS_SECS
    } else {
        &SYNC_BROADCAST_DELAYS_SECS
    };
    let index = (next_attempt.max(0) as usize).min(table.len() - 1);
    Duration::from_secs(table[index])
}

/// Computes rebroadcast times and publishes task announcements
#[derive(Clone)]
pub struct BroadcastHelper {
    transport: Arc<dyn BroadcastTransport>,
    feature_flags: Arc<dyn FeatureFlagService>,
    time_provider: Arc<dyn TimeProvider>,
}

impl BroadcastHelper {
    pub fn new(
        transport: Arc<dyn BroadcastTransport>,
        feature_flags: Arc<dyn FeatureFlagService>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            transport,
            feature_flags,
            time_provider,
        }
    }

    /// Absolute time (epoch ms) of the task's next broadcast attempt
    pub fn compute_next_broadcast_time(&self, task: &DelegateTask) -> i64 {
        let delay = next_broadcast_delay(task.broadcast_count.saturating_add(1), task.is_async);
        self.time_provider.now_millis() + delay.as_millis() as i64
    }

    /// Announce a freshly created task without blocking the caller
    pub fn broadcast_new_task_async(&self, task: DelegateTask) -> JoinHandle<()> {
        let helper = self.clone();
        tokio::spawn(async move {
            helper.rebroadcast_task(Some(&task)).await;
        })
    }

    /// Publish the task to `/stream/delegate/{account_id}`
    ///
    /// Never fails: publish errors are logged with task and account and the
    /// owning dispatch loop retries at the next computed time.
    pub async fn rebroadcast_task(&self, task: Option<&DelegateTask>) -> BroadcastOutcome {
        let Some(task) = task else {
            return BroadcastOutcome::NoTask;
        };

        if task.pre_assigned_delegate_id.is_none()
            && self
                .feature_flags
                .is_enabled(FeatureName::PerAgentCapabilities, &task.account_id)
                .await
        {
            debug!(
                task_id = %task.id,
                account_id = %task.account_id,
                "Skipping broadcast, task is matched by capability"
            );
            return BroadcastOutcome::CapabilityAssigned;
        }

        let channel = delegate_stream_channel(&task.account_id);
        let record = DelegateTaskBroadcast::from_task(task);

        match self.publish(&channel, &record).await {
            Ok(receivers) => {
                debug!(
                    task_id = %task.id,
                    account_id = %task.account_id,
                    broadcast_count = task.broadcast_count,
                    receivers = receivers,
                    "Delegate task broadcast"
                );
                BroadcastOutcome::Published { channel, receivers }
            }
            Err(e) => {
                error!(
                    task_id = %task.id,
                    account_id = %task.account_id,
                    error = %e,
                    "Failed to rebroadcast delegate task"
                );
                BroadcastOutcome::Failed
            }
        }
    }

    async fn publish(&self, channel: &str, record: &DelegateTaskBroadcast) -> Result<usize> {
        let broadcaster = self
            .transport
            .lookup(channel, true)
            .ok_or_else(|| AppError::Transport(format!("channel {} not available", channel)))?;
        broadcaster.publish(record).await
    }
}
