// Dispatch constants (No magic values)
use std::time::Duration;

/// Rebroadcast delays for asynchronous tasks, indexed by the next attempt
/// number and clamped to the last entry (every 15 minutes from attempt 6)
pub const ASYNC_BROADCAST_DELAYS_SECS: [u64; 7] = [0, 30, 60, 120, 240, 480, 900];

/// Rebroadcast delays for synchronous tasks, indexed by the next attempt
/// number and clamped to the last entry (every 5 minutes from attempt 5)
pub const SYNC_BROADCAST_DELAYS_SECS: [u64; 6] = [0, 5, 60, 120, 240, 300];

/// Heartbeat age after which a live connection record is stale (5 minutes)
pub const DEFAULT_CONNECTION_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// Disconnection sweep cadence (1 minute)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Stale connection records fetched per query page
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 500;

/// Rebroadcast loop cadence (5s)
pub const DEFAULT_REBROADCAST_INTERVAL: Duration = Duration::from_secs(5);

/// Due tasks fetched per rebroadcast tick
pub const DEFAULT_REBROADCAST_BATCH_SIZE: usize = 100;

/// Default task expiry when the submitter gives none (1 hour)
pub const DEFAULT_TASK_TIMEOUT_MS: i64 = 60 * 60 * 1000;

/// Longest expiry a submitter may request (7 days)
pub const MAX_TASK_TIMEOUT_MS: i64 = 7 * 24 * 60 * 60 * 1000;
