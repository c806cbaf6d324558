// Rebroadcast loop - re-announces queued tasks whose backoff has elapsed

use crate::application::broadcast::{BroadcastHelper, BroadcastOutcome};
use crate::application::constants::DEFAULT_REBROADCAST_BATCH_SIZE;
use crate::port::{TaskRepository, TimeProvider};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RebroadcastConfig {
    /// Due tasks fetched per tick
    pub batch_size: usize,
}

impl Default for RebroadcastConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_REBROADCAST_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RebroadcastReport {
    pub due: usize,
    pub published: usize,
    /// Claimed by another process, or held back for capability assignment
    pub skipped: usize,
    pub failed: usize,
}

/// Drives the Broadcast Scheduler for unclaimed tasks
pub struct RebroadcastService {
    task_repo: Arc<dyn TaskRepository>,
    broadcast_helper: BroadcastHelper,
    time_provider: Arc<dyn TimeProvider>,
    config: RebroadcastConfig,
}

impl RebroadcastService {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        broadcast_helper: BroadcastHelper,
        time_provider: Arc<dyn TimeProvider>,
        config: RebroadcastConfig,
    ) -> Self {
        Self {
            task_repo,
            broadcast_helper,
            time_provider,
            config,
        }
    }

    /// Rebroadcast every due task once
    ///
    /// Each attempt is claimed with a compare-and-set on `broadcast_count`
    /// before publishing, so replicas sharing the store never announce the
    /// same attempt twice.
    pub async fn run_once(&self) -> RebroadcastReport {
        let now = self.time_provider.now_millis();
        let mut report = RebroadcastReport::default();

        let due = match self
            .task_repo
            .find_due_for_broadcast(now, self.config.batch_size.max(1))
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to load tasks due for rebroadcast");
                return report;
            }
        };

        for mut task in due {
            report.due += 1;

            // The claimed count is this attempt; the delay is for the one after it
            let observed_count = task.broadcast_count;
            task.broadcast_count += 1;
            let next_broadcast = self.broadcast_helper.compute_next_broadcast_time(&task);

            match self
                .task_repo
                .record_broadcast(&task.id, observed_count, next_broadcast, now)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(task_id = %task.id, "Broadcast attempt already claimed");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        task_id = %task.id,
                        account_id = %task.account_id,
                        error = %e,
                        "Failed to record broadcast attempt"
                    );
                    report.failed += 1;
                    continue;
                }
            }

            task.last_broadcast_at = Some(now);
            task.next_broadcast = next_broadcast;

            match self.broadcast_helper.rebroadcast_task(Some(&task)).await {
                BroadcastOutcome::Published { .. } => report.published += 1,
                BroadcastOutcome::Failed => report.failed += 1,
                BroadcastOutcome::CapabilityAssigned | BroadcastOutcome::NoTask => {
                    report.skipped += 1
                }
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                published = report.published,
                skipped = report.skipped,
                failed = report.failed,
                "Rebroadcast tick complete"
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DelegateTask, TaskStatus};
    use crate::port::broadcaster::mocks::RecordingTransport;
    use crate::port::feature_flag::mocks::MockFeatureFlags;
    use crate::port::task_repository::mocks::InMemoryTaskRepository;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::TaskRepository;

    const NOW: i64 = 5_000_000;

    struct Fixture {
        service: RebroadcastService,
        repo: Arc<InMemoryTaskRepository>,
        transport: Arc<RecordingTransport>,
        clock: Arc<FixedTimeProvider>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryTaskRepository::new());
        let transport = Arc::new(RecordingTransport::new());
        let clock = Arc::new(FixedTimeProvider::new(NOW));
        let helper = BroadcastHelper::new(
            transport.clone(),
            Arc::new(MockFeatureFlags::new()),
            clock.clone(),
        );
        let service = RebroadcastService::new(
            repo.clone(),
            helper,
            clock.clone(),
            RebroadcastConfig::default(),
        );
        Fixture {
            service,
            repo,
            transport,
            clock,
        }
    }

    fn due_task(id: &str, is_async: bool) -> DelegateTask {
        let mut task = DelegateTask::new(id, "acct-1", "1", is_async, NOW - 60_000);
        task.next_broadcast = NOW - 1;
        task.expiry = NOW + 3_600_000;
        task
    }

    #[tokio::test]
    async fn test_due_task_is_advanced_and_published() {
        let f = fixture();
        f.repo.insert(&due_task("t-1", true)).await.unwrap();

        let report = f.service.run_once().await;

        assert_eq!(report.published, 1);
        let stored = f.repo.get("t-1").unwrap();
        assert_eq!(stored.broadcast_count, 1);
        assert_eq!(stored.last_broadcast_at, Some(NOW));
        // attempt 1 done, attempt 2 of an async task waits 60s
        assert_eq!(stored.next_broadcast, NOW + 60_000);
        assert_eq!(f.transport.publish_count(), 1);
    }

    #[tokio::test]
    async fn test_backoff_grows_until_capped() {
        let f = fixture();
        f.repo.insert(&due_task("t-sync", false)).await.unwrap();

        let mut delays = Vec::new();
        for _ in 0..7 {
            let next = f.repo.get("t-sync").unwrap().next_broadcast;
            f.clock.set(next.max(NOW));
            f.service.run_once().await;
            let stored = f.repo.get("t-sync").unwrap();
            delays.push((stored.next_broadcast - f.clock.now_millis()) / 1000);
        }

        assert_eq!(delays, vec![60, 120, 240, 300, 300, 300, 300]);
        assert_eq!(f.transport.publish_count(), 7);
    }

    #[tokio::test]
    async fn test_next_delay_follows_the_claimed_count() {
        let f = fixture();
        let mut task = due_task("t-sync", false);
        task.broadcast_count = 2;
        f.repo.insert(&task).await.unwrap();

        f.service.run_once().await;

        // attempt 3 was made now, attempt 4 of a sync task waits table[4] = 240s
        let stored = f.repo.get("t-sync").unwrap();
        assert_eq!(stored.broadcast_count, 3);
        assert_eq!(stored.next_broadcast, NOW + 240_000);
    }

    #[tokio::test]
    async fn test_not_yet_due_or_expired_or_started_is_ignored() {
        let f = fixture();
        let mut later = due_task("t-later", true);
        later.next_broadcast = NOW + 1;
        let mut expired = due_task("t-expired", true);
        expired.expiry = NOW;
        let mut started = due_task("t-started", true);
        started.status = TaskStatus::Started;
        for t in [&later, &expired, &started] {
            f.repo.insert(t).await.unwrap();
        }

        let report = f.service.run_once().await;

        assert_eq!(report, RebroadcastReport::default());
        assert_eq!(f.transport.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_lost_claim_skips_publish() {
        let f = fixture();
        f.repo.insert(&due_task("t-1", true)).await.unwrap();

        // Another replica advances the task between our read and our claim
        struct RacingRepo(Arc<InMemoryTaskRepository>);

        #[async_trait::async_trait]
        impl TaskRepository for RacingRepo {
            async fn insert(&self, task: &DelegateTask) -> crate::Result<()> {
                self.0.insert(task).await
            }
            async fn find_by_id(&self, id: &String) -> crate::Result<Option<DelegateTask>> {
                self.0.find_by_id(id).await
            }
            async fn find_due_for_broadcast(
                &self,
                now: i64,
                limit: usize,
            ) -> crate::Result<Vec<DelegateTask>> {
                let due = self.0.find_due_for_broadcast(now, limit).await?;
                for t in &due {
                    self.0.bump_broadcast_count(&t.id);
                }
                Ok(due)
            }
            async fn record_broadcast(
                &self,
                id: &String,
                expected_count: i32,
                next_broadcast: i64,
                now: i64,
            ) -> crate::Result<bool> {
                self.0
                    .record_broadcast(id, expected_count, next_broadcast, now)
                    .await
            }
            async fn mark_started(&self, id: &String) -> crate::Result<bool> {
                self.0.mark_started(id).await
            }
            async fn update_tried_delegates(
                &self,
                id: &String,
                tried: &[String],
            ) -> crate::Result<bool> {
                self.0.update_tried_delegates(id, tried).await
            }
            async fn count_by_status(&self, status: TaskStatus) -> crate::Result<i64> {
                self.0.count_by_status(status).await
            }
        }

        let helper = BroadcastHelper::new(
            f.transport.clone(),
            Arc::new(MockFeatureFlags::new()),
            f.clock.clone(),
        );
        let service = RebroadcastService::new(
            Arc::new(RacingRepo(f.repo.clone())),
            helper,
            f.clock.clone(),
            RebroadcastConfig::default(),
        );

        let report = service.run_once().await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.published, 0);
        assert_eq!(f.transport.publish_count(), 0);
    }
}
