// Periodic runner for the disconnection sweep and the rebroadcast loop

use crate::application::disconnect::{DisconnectedDetector, SweepOutcome};
use crate::application::rebroadcast::RebroadcastService;
use crate::application::shutdown::ShutdownToken;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Unit of work executed on every tick.
///
/// `run_once` must contain its own errors; the runner only sequences ticks.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_once(&self);
}

#[async_trait]
impl PeriodicTask for DisconnectedDetector {
    fn name(&self) -> &'static str {
        "disconnection-sweep"
    }

    async fn run_once(&self) {
        if let SweepOutcome::NotPrimary = self.detect_disconnections().await {
            debug!("Disconnection sweep skipped on non-primary");
        }
    }
}

#[async_trait]
impl PeriodicTask for RebroadcastService {
    fn name(&self) -> &'static str {
        "rebroadcast"
    }

    async fn run_once(&self) {
        RebroadcastService::run_once(self).await;
    }
}

/// Runs a task at a fixed cadence until shutdown
///
/// Ticks never overlap: a tick that outlasts the interval delays the next one
/// and missed ticks are skipped.
pub struct PeriodicScheduler {
    task: Arc<dyn PeriodicTask>,
    period: Duration,
}

impl PeriodicScheduler {
    pub fn new(task: Arc<dyn PeriodicTask>, period: Duration) -> Self {
        Self { task, period }
    }

    /// Run loop (background task)
    ///
    /// Should be spawned in tokio::spawn
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            task = self.task.name(),
            period_ms = self.period.as_millis() as u64,
            "Periodic task started"
        );

        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if shutdown.is_shutdown() {
                break;
            }
            tokio::select! {
                _ = tick.tick() => {
                    self.task.run_once().await;
                }
                _ = shutdown.wait() => {
                    break;
                }
            }
        }

        info!(task = self.task.name(), "Periodic task stopped");
    }
}
