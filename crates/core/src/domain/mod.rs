// Domain Layer - Pure business logic and entities

pub mod broadcast;
pub mod connection;
pub mod delegate;
pub mod error;
pub mod task;

// Re-exports
pub use broadcast::DelegateTaskBroadcast;
pub use connection::{ConnectionId, DelegateConnection};
pub use delegate::{Delegate, DelegateId};
pub use error::DomainError;
pub use task::{AccountId, DelegateTask, TaskId, TaskStatus};
