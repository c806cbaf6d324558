//! Disconnection sweep against SQLite with the in-process adapters

use std::sync::Arc;
use std::time::Duration;

use dispatch_core::application::{DetectorConfig, DisconnectedDetector, SweepOutcome, SweepReport};
use dispatch_core::domain::{Delegate, DelegateConnection};
use dispatch_core::port::time_provider::mocks::FixedTimeProvider;
use dispatch_core::port::{ConnectionRepository, DelegateRepository, LeaderElection};
use dispatch_infra_memory::{
    AlwaysPrimary, CachedDelegateLookup, DelegateLifecycleEvent, LifecycleEventBus,
};
use dispatch_infra_sqlite::{
    create_pool, run_migrations, SqliteConnectionRepository, SqliteDelegateRepository,
    SqliteLeaderLease,
};
use sqlx::SqlitePool;
use tokio::sync::broadcast::Receiver;

const NOW: i64 = 1_700_000_000_000;
const EXPIRY: Duration = Duration::from_secs(300);
const STALE: i64 = NOW - 300_000 - 1;
const FRESH: i64 = NOW - 10_000;

struct Harness {
    pool: SqlitePool,
    connections: Arc<SqliteConnectionRepository>,
    delegates: Arc<SqliteDelegateRepository>,
    clock: Arc<FixedTimeProvider>,
    bus: Arc<LifecycleEventBus>,
    events: Receiver<DelegateLifecycleEvent>,
}

impl Harness {
    async fn new() -> Self {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let bus = Arc::new(LifecycleEventBus::new());
        let events = bus.subscribe();
        Self {
            connections: Arc::new(SqliteConnectionRepository::new(pool.clone())),
            delegates: Arc::new(SqliteDelegateRepository::new(pool.clone())),
            clock: Arc::new(FixedTimeProvider::new(NOW)),
            pool,
            bus,
            events,
        }
    }

    fn detector(&self, leader: Arc<dyn LeaderElection>, batch_size: usize) -> DisconnectedDetector {
        let cache = Arc::new(CachedDelegateLookup::new(
            self.delegates.clone(),
            self.clock.clone(),
            Duration::from_secs(30),
        ));
        DisconnectedDetector::new(
            self.connections.clone(),
            cache,
            self.bus.clone(),
            leader,
            self.clock.clone(),
            DetectorConfig {
                expiry: EXPIRY,
                batch_size,
            },
        )
    }

    async fn delegate(&self, id: &str, version: &str) {
        self.delegates
            .upsert(&Delegate::new(id, "acct-1", version, false))
            .await
            .unwrap();
    }

    async fn connection(&self, id: &str, delegate: &str, version: &str, heartbeat: i64) {
        self.connections
            .upsert(&DelegateConnection::new(id, "acct-1", delegate, version, heartbeat))
            .await
            .unwrap();
    }

    fn drain_events(&mut self) -> Vec<String> {
        let mut connection_ids = Vec::new();
        while let Ok(DelegateLifecycleEvent::Disconnected { connection_id, .. }) =
            self.events.try_recv()
        {
            connection_ids.push(connection_id);
        }
        connection_ids
    }
}

fn completed(outcome: SweepOutcome) -> SweepReport {
    match outcome {
        SweepOutcome::Completed(report) => report,
        SweepOutcome::NotPrimary => panic!("expected the sweep to run"),
    }
}

#[tokio::test]
async fn test_stale_same_version_notifies_once_and_deletes() {
    let mut h = Harness::new().await;
    h.delegate("d-1", "1").await;
    h.connection("c-1", "d-1", "1", STALE).await;

    let report = completed(h.detector(Arc::new(AlwaysPrimary), 500).detect_disconnections().await);

    assert_eq!(report.notified, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(h.drain_events(), vec!["c-1".to_string()]);
    assert!(h.connections.find_by_id("c-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_delegate_is_cleanup_only() {
    let mut h = Harness::new().await;
    h.connection("c-1", "d-gone", "1", STALE).await;

    let report = completed(h.detector(Arc::new(AlwaysPrimary), 500).detect_disconnections().await);

    assert_eq!(report.removed, 1);
    assert_eq!(report.notified, 0);
    assert!(h.drain_events().is_empty());
    assert!(h.connections.find_by_id("c-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_version_mismatch_without_fresh_record_notifies() {
    let mut h = Harness::new().await;
    h.delegate("d-1", "2").await;
    h.connection("c-old", "d-1", "1", STALE).await;

    let report = completed(h.detector(Arc::new(AlwaysPrimary), 500).detect_disconnections().await);

    // Conservative: the stale record is the only evidence, so it is reported
    assert_eq!(report.notified, 1);
    assert_eq!(h.drain_events(), vec!["c-old".to_string()]);
    assert!(h.connections.find_by_id("c-old").await.unwrap().is_none());
}

#[tokio::test]
async fn test_version_mismatch_with_fresh_record_only_deletes() {
    let mut h = Harness::new().await;
    h.delegate("d-1", "2").await;
    h.connection("c-old", "d-1", "1", STALE).await;
    h.connection("c-new", "d-1", "2", FRESH).await;

    let report = completed(h.detector(Arc::new(AlwaysPrimary), 500).detect_disconnections().await);

    assert_eq!(report.scanned, 1);
    assert_eq!(report.notified, 0);
    assert!(h.drain_events().is_empty());
    assert!(h.connections.find_by_id("c-old").await.unwrap().is_none());
    assert!(h.connections.find_by_id("c-new").await.unwrap().is_some());
}

#[tokio::test]
async fn test_second_sweep_finds_nothing() {
    let h = Harness::new().await;
    h.delegate("d-1", "1").await;
    h.connection("c-1", "d-1", "1", STALE).await;
    h.connection("c-2", "d-gone", "1", STALE - 5).await;
    let detector = h.detector(Arc::new(AlwaysPrimary), 500);

    let first = completed(detector.detect_disconnections().await);
    let second = completed(detector.detect_disconnections().await);

    assert_eq!(first.scanned, 2);
    assert_eq!(second, SweepReport::default());
}

#[tokio::test]
async fn test_sweep_pages_through_large_backlog() {
    let h = Harness::new().await;
    h.delegate("d-1", "1").await;
    for i in 0..1_205 {
        // Many records share a heartbeat to exercise the id tie-break
        h.connection(&format!("c-{:05}", i), "d-1", "1", STALE - (i % 7))
            .await;
    }
    h.connection("c-live", "d-1", "1", FRESH).await;

    let report = completed(h.detector(Arc::new(AlwaysPrimary), 100).detect_disconnections().await);

    assert_eq!(report.scanned, 1_205);
    assert_eq!(report.removed, 1_205);
    assert_eq!(h.connections.count_live(0).await.unwrap(), 1);
}

#[tokio::test]
async fn test_only_lease_holder_sweeps() {
    let mut h = Harness::new().await;
    h.delegate("d-1", "1").await;
    h.connection("c-1", "d-1", "1", STALE).await;

    let lease_a = Arc::new(SqliteLeaderLease::new(
        h.pool.clone(),
        "node-a",
        Duration::from_secs(30),
        h.clock.clone(),
    ));
    let lease_b = Arc::new(SqliteLeaderLease::new(
        h.pool.clone(),
        "node-b",
        Duration::from_secs(30),
        h.clock.clone(),
    ));
    assert!(lease_a.is_primary().await);

    let outcome = h.detector(lease_b, 500).detect_disconnections().await;
    assert_eq!(outcome, SweepOutcome::NotPrimary);
    assert!(h.connections.find_by_id("c-1").await.unwrap().is_some());

    let report = completed(h.detector(lease_a, 500).detect_disconnections().await);
    assert_eq!(report.notified, 1);
    assert_eq!(h.drain_events().len(), 1);
}
