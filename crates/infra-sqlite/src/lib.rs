// Dispatch Infrastructure - SQLite Adapter
// Implements: TaskRepository, ConnectionRepository, DelegateRepository, LeaderElection

mod connection;
mod connection_repository;
mod delegate_repository;
mod error;
mod leader_lease;
mod migration;
mod task_repository;

pub use connection::create_pool;
pub use connection_repository::SqliteConnectionRepository;
pub use delegate_repository::SqliteDelegateRepository;
pub use leader_lease::{SqliteLeaderLease, DEFAULT_LEASE_NAME};
pub use migration::run_migrations;
pub use task_repository::SqliteTaskRepository;

// Note: sqlx::Error conversion is handled by error::map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
