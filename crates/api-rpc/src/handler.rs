//! RPC Method Handlers

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    HeartbeatResponse, RegisterDelegateRequest, RegisterDelegateResponse, StatsRequest,
    StatsResponse, SubmitTaskResponse, SweepRequest, SweepResponse, TaskResponseRequest,
    TaskStateResponse,
};
use dispatch_core::application::{
    ConnectionService, DisconnectedDetector, HeartbeatRequest, SubmitTaskRequest, SweepOutcome,
    TaskDispatchService,
};
use dispatch_core::domain::broadcast::delegate_stream_channel;
use dispatch_core::domain::{Delegate, DelegateTask, TaskStatus};
use dispatch_core::port::{ConnectionRepository, TaskRepository, TimeProvider};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Services and repositories the handlers delegate to
pub struct RpcContext {
    pub dispatch: Arc<TaskDispatchService>,
    pub connections: Arc<ConnectionService>,
    pub detector: Arc<DisconnectedDetector>,
    pub task_repo: Arc<dyn TaskRepository>,
    pub connection_repo: Arc<dyn ConnectionRepository>,
    pub time_provider: Arc<dyn TimeProvider>,
    /// Heartbeat age after which a connection no longer counts as live
    pub connection_expiry: Duration,
}

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    ctx: RpcContext,
    rate_limiter: RateLimiter,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(ctx: RpcContext, rate_limiter: RateLimiter) -> Self {
        Self {
            ctx,
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    fn throttle(&self) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.check() {
            Ok(())
        } else {
            debug!("Request throttled");
            Err(throttled())
        }
    }

    /// task.submit.v1
    pub async fn submit_task(
        &self,
        params: SubmitTaskRequest,
    ) -> Result<SubmitTaskResponse, ErrorObjectOwned> {
        self.throttle()?;

        let task = self.ctx.dispatch.submit(params).await.map_err(to_rpc_error)?;

        Ok(SubmitTaskResponse {
            channel: delegate_stream_channel(&task.account_id),
            task_id: task.id,
            status: task.status.to_string(),
            next_broadcast: task.next_broadcast,
            expiry: task.expiry,
        })
    }

    /// task.claim.v1
    pub async fn claim_task(
        &self,
        params: TaskResponseRequest,
    ) -> Result<TaskStateResponse, ErrorObjectOwned> {
        self.throttle()?;

        let task = self
            .ctx
            .dispatch
            .claim(&params.task_id, &params.delegate_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(task_state(task))
    }

    /// task.decline.v1
    pub async fn decline_task(
        &self,
        params: TaskResponseRequest,
    ) -> Result<TaskStateResponse, ErrorObjectOwned> {
        self.throttle()?;

        let task = self
            .ctx
            .dispatch
            .decline(&params.task_id, &params.delegate_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(task_state(task))
    }

    /// delegate.register.v1
    pub async fn register_delegate(
        &self,
        params: RegisterDelegateRequest,
    ) -> Result<RegisterDelegateResponse, ErrorObjectOwned> {
        self.throttle()?;

        let mut delegate = Delegate::new(
            params.delegate_id,
            params.account_id,
            params.version,
            params.polling_mode,
        );
        delegate.hostname = params.hostname;
        let delegate_id = delegate.id.clone();

        self.ctx
            .connections
            .register_delegate(delegate)
            .await
            .map_err(to_rpc_error)?;

        Ok(RegisterDelegateResponse {
            delegate_id,
            registered: true,
        })
    }

    /// delegate.heartbeat.v1
    pub async fn heartbeat(
        &self,
        params: HeartbeatRequest,
    ) -> Result<HeartbeatResponse, ErrorObjectOwned> {
        self.throttle()?;

        let conn = self
            .ctx
            .connections
            .record_heartbeat(params)
            .await
            .map_err(to_rpc_error)?;

        Ok(HeartbeatResponse {
            connection_id: conn.id,
            last_heartbeat: conn.last_heartbeat,
        })
    }

    /// admin.sweep.v1
    pub async fn sweep(&self, _params: SweepRequest) -> Result<SweepResponse, ErrorObjectOwned> {
        self.throttle()?;

        let response = match self.ctx.detector.detect_disconnections().await {
            SweepOutcome::NotPrimary => SweepResponse {
                primary: false,
                scanned: 0,
                notified: 0,
                removed: 0,
                skipped: 0,
                failed: 0,
            },
            SweepOutcome::Completed(report) => SweepResponse {
                primary: true,
                scanned: report.scanned,
                notified: report.notified,
                removed: report.removed,
                skipped: report.skipped,
                failed: report.failed,
            },
        };
        Ok(response)
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let queued_tasks = self
            .ctx
            .task_repo
            .count_by_status(TaskStatus::Queued)
            .await
            .map_err(to_rpc_error)?;

        let started_tasks = self
            .ctx
            .task_repo
            .count_by_status(TaskStatus::Started)
            .await
            .map_err(to_rpc_error)?;

        let cutoff =
            self.ctx.time_provider.now_millis() - self.ctx.connection_expiry.as_millis() as i64;
        let live_connections = self
            .ctx
            .connection_repo
            .count_live(cutoff)
            .await
            .map_err(to_rpc_error)?;

        Ok(StatsResponse {
            queued_tasks,
            started_tasks,
            live_connections,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }
}

fn task_state(task: DelegateTask) -> TaskStateResponse {
    TaskStateResponse {
        task_id: task.id,
        status: task.status.to_string(),
        already_tried_delegates: task.already_tried_delegates,
    }
}
