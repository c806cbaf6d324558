//! JSON-RPC Server
//!
//! Serves JSON-RPC 2.0 over TCP bound to localhost.

use crate::handler::RpcHandler;
use crate::types::{RegisterDelegateRequest, StatsRequest, SweepRequest, TaskResponseRequest};
use dispatch_core::application::{HeartbeatRequest, SubmitTaskRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// # Returns
    /// Bound address and the handle that stops the server
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = self.build_module()?;

        info!(addr = %local_addr, "JSON-RPC server started");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }

    fn build_module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module.register_async_method("task.submit.v1", move |params, _, _| {
            let handler = handler.clone();
            async move {
                let req: SubmitTaskRequest = params.parse()?;
                handler.submit_task(req).await
            }
        })
        .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module.register_async_method("task.claim.v1", move |params, _, _| {
            let handler = handler.clone();
            async move {
                let req: TaskResponseRequest = params.parse()?;
                handler.claim_task(req).await
            }
        })
        .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module.register_async_method("task.decline.v1", move |params, _, _| {
            let handler = handler.clone();
            async move {
                let req: TaskResponseRequest = params.parse()?;
                handler.decline_task(req).await
            }
        })
        .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module.register_async_method("delegate.register.v1", move |params, _, _| {
            let handler = handler.clone();
            async move {
                let req: RegisterDelegateRequest = params.parse()?;
                handler.register_delegate(req).await
            }
        })
        .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module.register_async_method("delegate.heartbeat.v1", move |params, _, _| {
            let handler = handler.clone();
            async move {
                let req: HeartbeatRequest = params.parse()?;
                handler.heartbeat(req).await
            }
        })
        .map_err(|e| e.to_string())?;

        // Admin APIs
        let handler = self.handler.clone();
        module.register_async_method("admin.sweep.v1", move |params, _, _| {
            let handler = handler.clone();
            async move {
                let req: SweepRequest = params.parse().unwrap_or_default();
                handler.sweep(req).await
            }
        })
        .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module.register_async_method("admin.stats.v1", move |params, _, _| {
            let handler = handler.clone();
            async move {
                let req: StatsRequest = params.parse().unwrap_or_default();
                handler.stats(req).await
            }
        })
        .map_err(|e| e.to_string())?;

        Ok(module)
    }
}
