// Application Layer - Use Cases and Business Logic

pub mod broadcast;
pub mod connection;
pub mod constants;
pub mod disconnect;
pub mod dispatch;
pub mod periodic;
pub mod rebroadcast;
pub mod shutdown;

// Re-exports
pub use broadcast::{next_broadcast_delay, BroadcastHelper, BroadcastOutcome};
pub use connection::{ConnectionService, HeartbeatRequest};
pub use disconnect::{
    ConnectionCheck, ConnectionResolution, DetectorConfig, DisconnectedDetector, SweepOutcome,
    SweepReport,
};
pub use dispatch::{SubmitTaskRequest, TaskDispatchService};
pub use periodic::{PeriodicScheduler, PeriodicTask};
pub use rebroadcast::{RebroadcastConfig, RebroadcastReport, RebroadcastService};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
