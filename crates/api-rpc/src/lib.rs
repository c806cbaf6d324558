//! JSON-RPC API Layer
//!
//! Ingress for task submission, delegate heartbeats and admin operations
//! of the Dispatch Engine.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::{RpcContext, RpcHandler};
pub use rate_limiter::RateLimiter;
pub use server::{RpcServer, RpcServerConfig};
