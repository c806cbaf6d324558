// Port Layer - Interfaces for external dependencies

pub mod broadcaster;
pub mod connection_repository;
pub mod delegate_cache;
pub mod delegate_repository;
pub mod feature_flag;
pub mod id_provider; // For deterministic testing
pub mod leader;
pub mod lifecycle;
pub mod task_repository;
pub mod time_provider;

// Re-exports
pub use broadcaster::{BroadcastChannel, BroadcastTransport};
pub use connection_repository::{ConnectionRepository, StaleCursor};
pub use delegate_cache::DelegateCache;
pub use delegate_repository::DelegateRepository;
pub use feature_flag::{FeatureFlagService, FeatureName};
pub use id_provider::IdProvider;
pub use leader::LeaderElection;
pub use lifecycle::DelegateLifecycle;
pub use task_repository::TaskRepository;
pub use time_provider::TimeProvider;
