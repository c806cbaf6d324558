//! Disconnection Detector - resolves stale delegate connection records
//!
//! A record is stale when it is not flagged disconnected and its last
//! heartbeat is older than the expiry threshold. Each stale record is
//! resolved independently. The delete only succeeds while the record is
//! still stale and comes before the notification, so a heartbeat that lands
//! mid-sweep keeps its record and its delegate is not declared disconnected.

use crate::application::constants::{DEFAULT_CONNECTION_EXPIRY, DEFAULT_SWEEP_BATCH_SIZE};
use crate::domain::{Delegate, DelegateConnection};
use crate::error::Result;
use crate::port::{
    ConnectionRepository, DelegateCache, DelegateLifecycle, LeaderElection, StaleCursor,
    TimeProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Detector configuration
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Heartbeat age after which a live record is stale
    pub expiry: Duration,

    /// Stale records fetched per query page
    pub batch_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            expiry: DEFAULT_CONNECTION_EXPIRY,
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

/// What the delegate registry says about a stale record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCheck {
    /// The delegate was removed
    DelegateMissing,
    /// The delegate still reports the record's version
    SameVersion,
    /// The delegate reconnected with another version
    VersionChanged { current_version: String },
}

/// Action to take for a stale record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionResolution {
    /// Delete the record only
    Remove,
    /// Declare the delegate disconnected, then delete the record
    NotifyAndRemove,
}

/// Classify a stale record against the delegate's current state
pub fn check_connection(conn: &DelegateConnection, delegate: Option<&Delegate>) -> ConnectionCheck {
    match delegate {
        None => ConnectionCheck::DelegateMissing,
        Some(d) if d.version == conn.version => ConnectionCheck::SameVersion,
        Some(d) => ConnectionCheck::VersionChanged {
            current_version: d.version.clone(),
        },
    }
}

/// Decide the resolution.
///
/// `fresher_connection_exists` only matters for `VersionChanged`: a live record
/// for the delegate's current version proves the delegate is up. Without one,
/// the stale record is the only evidence left and the delegate is declared
/// disconnected even though it reported a different version.
pub fn resolve(check: &ConnectionCheck, fresher_connection_exists: bool) -> ConnectionResolution {
    match check {
        ConnectionCheck::DelegateMissing => ConnectionResolution::Remove,
        ConnectionCheck::SameVersion => ConnectionResolution::NotifyAndRemove,
        ConnectionCheck::VersionChanged { .. } if fresher_connection_exists => {
            ConnectionResolution::Remove
        }
        ConnectionCheck::VersionChanged { .. } => ConnectionResolution::NotifyAndRemove,
    }
}

/// Counters for one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub notified: usize,
    pub removed: usize,
    /// Refreshed by a heartbeat after the scan read them
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another process is primary, nothing was touched
    NotPrimary,
    Completed(SweepReport),
}

/// Periodic sweep declaring silently dropped delegates disconnected
pub struct DisconnectedDetector {
    connection_repo: Arc<dyn ConnectionRepository>,
    delegate_cache: Arc<dyn DelegateCache>,
    lifecycle: Arc<dyn DelegateLifecycle>,
    leader: Arc<dyn LeaderElection>,
    time_provider: Arc<dyn TimeProvider>,
    config: DetectorConfig,
}

impl DisconnectedDetector {
    pub fn new(
        connection_repo: Arc<dyn ConnectionRepository>,
        delegate_cache: Arc<dyn DelegateCache>,
        lifecycle: Arc<dyn DelegateLifecycle>,
        leader: Arc<dyn LeaderElection>,
        time_provider: Arc<dyn TimeProvider>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            connection_repo,
            delegate_cache,
            lifecycle,
            leader,
            time_provider,
            config,
        }
    }

    /// Run one sweep
    ///
    /// Algorithm:
    /// 1. Skip unless this process is primary
    /// 2. Page through stale records oldest heartbeat first
    /// 3. Resolve each record (see [`resolve`]), delete it if still stale,
    ///    then notify
    ///
    /// Errors never escape: a failing record is logged and counted, a failing
    /// query ends the sweep with the partial report.
    pub async fn detect_disconnections(&self) -> SweepOutcome {
        if !self.leader.is_primary().await {
            debug!("Not primary, skipping disconnection sweep");
            return SweepOutcome::NotPrimary;
        }

        let now = self.time_provider.now_millis();
        let cutoff = now - self.config.expiry.as_millis() as i64;
        let batch_size = self.config.batch_size.max(1);

        let mut report = SweepReport::default();
        let mut cursor: Option<StaleCursor> = None;

        loop {
            let batch = match self
                .connection_repo
                .find_stale(cutoff, cursor.as_ref(), batch_size)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, cutoff = cutoff, "Failed to query stale delegate connections");
                    break;
                }
            };

            let fetched = batch.len();
            for conn in &batch {
                report.scanned += 1;
                match self.resolve_connection(conn, cutoff).await {
                    Ok(Some(resolution)) => {
                        if resolution == ConnectionResolution::NotifyAndRemove {
                            report.notified += 1;
                        }
                        report.removed += 1;
                    }
                    Ok(None) => {
                        report.skipped += 1;
                        debug!(
                            connection_id = %conn.id,
                            delegate_id = %conn.delegate_id,
                            "Connection refreshed during sweep"
                        );
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            connection_id = %conn.id,
                            account_id = %conn.account_id,
                            delegate_id = %conn.delegate_id,
                            error = %e,
                            "Failed to resolve stale delegate connection"
                        );
                    }
                }
            }

            cursor = batch.last().map(StaleCursor::after);
            if fetched < batch_size {
                break;
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                notified = report.notified,
                removed = report.removed,
                skipped = report.skipped,
                failed = report.failed,
                "Disconnection sweep complete"
            );
        }

        SweepOutcome::Completed(report)
    }

    /// `None` when the record was refreshed or removed since the scan
    async fn resolve_connection(
        &self,
        conn: &DelegateConnection,
        cutoff: i64,
    ) -> Result<Option<ConnectionResolution>> {
        let delegate = self
            .delegate_cache
            .get(&conn.account_id, &conn.delegate_id, false)
            .await?;

        let check = check_connection(conn, delegate.as_ref());
        let fresher_connection_exists = match &check {
            ConnectionCheck::VersionChanged { current_version } => {
                self.connection_repo
                    .exists_fresh(&conn.account_id, &conn.delegate_id, current_version, cutoff)
                    .await?
            }
            _ => false,
        };

        let resolution = resolve(&check, fresher_connection_exists);
        if !self.connection_repo.delete_if_stale(&conn.id, cutoff).await? {
            return Ok(None);
        }

        if resolution == ConnectionResolution::NotifyAndRemove {
            if let Some(delegate) = delegate.as_ref() {
                self.handle_disconnection(delegate, conn).await;
            }
        }
        Ok(Some(resolution))
    }

    async fn handle_disconnection(&self, delegate: &Delegate, conn: &DelegateConnection) {
        info!(
            account_id = %conn.account_id,
            delegate_id = %conn.delegate_id,
            connection_id = %conn.id,
            version = %conn.version,
            last_heartbeat = conn.last_heartbeat,
            "Delegate disconnection detected"
        );

        if !delegate.polling_mode {
            error!(
                account_id = %conn.account_id,
                delegate_id = %conn.delegate_id,
                connection_id = %conn.id,
                "Non-polling delegate stopped sending heartbeats"
            );
        }

        if let Err(e) = self
            .lifecycle
            .on_disconnected(&conn.account_id, &conn.delegate_id, &conn.id)
            .await
        {
            error!(
                account_id = %conn.account_id,
                delegate_id = %conn.delegate_id,
                connection_id = %conn.id,
                error = %e,
                "Delegate lifecycle notification failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::connection_repository::mocks::InMemoryConnectionRepository;
    use crate::port::delegate_cache::mocks::MockDelegateCache;
    use crate::port::leader::mocks::FixedLeader;
    use crate::port::lifecycle::mocks::RecordingLifecycle;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    const NOW: i64 = 10_000_000;
    const EXPIRY_MS: i64 = 5 * 60 * 1000;
    const STALE: i64 = NOW - EXPIRY_MS - 1;
    const FRESH: i64 = NOW - 1_000;

    struct Fixture {
        detector: DisconnectedDetector,
        repo: Arc<InMemoryConnectionRepository>,
        lifecycle: Arc<RecordingLifecycle>,
        leader: Arc<FixedLeader>,
    }

    fn fixture(records: Vec<DelegateConnection>, delegates: Vec<Delegate>) -> Fixture {
        fixture_with(records, delegates, RecordingLifecycle::new(), 500)
    }

    fn fixture_with(
        records: Vec<DelegateConnection>,
        delegates: Vec<Delegate>,
        lifecycle: RecordingLifecycle,
        batch_size: usize,
    ) -> Fixture {
        let repo = Arc::new(InMemoryConnectionRepository::with_records(records));
        let lifecycle = Arc::new(lifecycle);
        let leader = Arc::new(FixedLeader::new(true));
        let detector = DisconnectedDetector::new(
            repo.clone(),
            Arc::new(MockDelegateCache::new(delegates)),
            lifecycle.clone(),
            leader.clone(),
            Arc::new(FixedTimeProvider::new(NOW)),
            DetectorConfig {
                expiry: Duration::from_millis(EXPIRY_MS as u64),
                batch_size,
            },
        );
        Fixture {
            detector,
            repo,
            lifecycle,
            leader,
        }
    }

    fn conn(id: &str, delegate: &str, version: &str, last_heartbeat: i64) -> DelegateConnection {
        DelegateConnection::new(id, "acct-1", delegate, version, last_heartbeat)
    }

    fn report(outcome: SweepOutcome) -> SweepReport {
        match outcome {
            SweepOutcome::Completed(report) => report,
            SweepOutcome::NotPrimary => panic!("expected a completed sweep"),
        }
    }

    #[test]
    fn test_resolve_decision_table() {
        let changed = ConnectionCheck::VersionChanged {
            current_version: "2".to_string(),
        };
        assert_eq!(
            resolve(&ConnectionCheck::DelegateMissing, false),
            ConnectionResolution::Remove
        );
        assert_eq!(
            resolve(&ConnectionCheck::SameVersion, true),
            ConnectionResolution::NotifyAndRemove
        );
        assert_eq!(resolve(&changed, true), ConnectionResolution::Remove);
        assert_eq!(resolve(&changed, false), ConnectionResolution::NotifyAndRemove);
    }

    #[test]
    fn test_check_connection() {
        let c = conn("c-1", "d-1", "1", STALE);
        assert_eq!(check_connection(&c, None), ConnectionCheck::DelegateMissing);

        let same = Delegate::new("d-1", "acct-1", "1", false);
        assert_eq!(check_connection(&c, Some(&same)), ConnectionCheck::SameVersion);

        let newer = Delegate::new("d-1", "acct-1", "2", false);
        assert_eq!(
            check_connection(&c, Some(&newer)),
            ConnectionCheck::VersionChanged {
                current_version: "2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_stale_record_with_matching_version_notifies_once() {
        let f = fixture(
            vec![conn("c-1", "d-1", "1", STALE)],
            vec![Delegate::new("d-1", "acct-1", "1", false)],
        );

        let r = report(f.detector.detect_disconnections().await);

        assert_eq!(r.notified, 1);
        assert_eq!(r.removed, 1);
        assert_eq!(
            f.lifecycle.calls(),
            vec![("acct-1".to_string(), "d-1".to_string(), "c-1".to_string())]
        );
        assert!(!f.repo.contains("c-1"));
    }

    #[tokio::test]
    async fn test_missing_delegate_removes_without_notify() {
        let f = fixture(vec![conn("c-1", "gone", "1", STALE)], vec![]);

        let r = report(f.detector.detect_disconnections().await);

        assert_eq!(r.removed, 1);
        assert_eq!(r.notified, 0);
        assert_eq!(f.lifecycle.call_count(), 0);
        assert!(f.repo.is_empty());
    }

    // The delegate already reconnected with version 2 but no fresh v2 record
    // exists, so it is declared disconnected anyway. This double notification
    // is kept on purpose: any stale record without live evidence is suspect.
    #[tokio::test]
    async fn test_version_mismatch_without_fresh_record_still_notifies() {
        let f = fixture(
            vec![conn("c-old", "d-1", "1", STALE)],
            vec![Delegate::new("d-1", "acct-1", "2", true)],
        );

        let r = report(f.detector.detect_disconnections().await);

        assert_eq!(r.notified, 1);
        assert_eq!(f.lifecycle.call_count(), 1);
        assert!(!f.repo.contains("c-old"));
    }

    #[tokio::test]
    async fn test_version_mismatch_with_fresh_record_only_removes() {
        let f = fixture(
            vec![
                conn("c-old", "d-1", "1", STALE),
                conn("c-new", "d-1", "2", FRESH),
            ],
            vec![Delegate::new("d-1", "acct-1", "2", false)],
        );

        let r = report(f.detector.detect_disconnections().await);

        assert_eq!(r.scanned, 1);
        assert_eq!(r.notified, 0);
        assert_eq!(f.lifecycle.call_count(), 0);
        assert!(!f.repo.contains("c-old"));
        assert!(f.repo.contains("c-new"));
    }

    #[tokio::test]
    async fn test_fresh_and_disconnected_records_are_ignored() {
        let mut flagged = conn("c-flagged", "d-1", "1", STALE);
        flagged.disconnected = true;
        let f = fixture(
            vec![conn("c-live", "d-1", "1", FRESH), flagged],
            vec![Delegate::new("d-1", "acct-1", "1", false)],
        );

        let r = report(f.detector.detect_disconnections().await);

        assert_eq!(r, SweepReport::default());
        assert_eq!(f.repo.len(), 2);
    }

    #[tokio::test]
    async fn test_second_sweep_finds_nothing() {
        let f = fixture(
            vec![
                conn("c-1", "d-1", "1", STALE),
                conn("c-2", "d-2", "1", STALE - 10),
                conn("c-3", "gone", "1", STALE - 20),
            ],
            vec![
                Delegate::new("d-1", "acct-1", "1", false),
                Delegate::new("d-2", "acct-1", "1", true),
            ],
        );

        let first = report(f.detector.detect_disconnections().await);
        let second = report(f.detector.detect_disconnections().await);

        assert_eq!(first.scanned, 3);
        assert_eq!(first.notified, 2);
        assert_eq!(second, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_pages_oldest_first() {
        let records = (0..7)
            .map(|i| conn(&format!("c-{}", i), "d-1", "1", STALE - 100 + i))
            .collect();
        let f = fixture_with(
            records,
            vec![Delegate::new("d-1", "acct-1", "1", false)],
            RecordingLifecycle::new(),
            3,
        );

        let r = report(f.detector.detect_disconnections().await);

        assert_eq!(r.scanned, 7);
        assert_eq!(r.removed, 7);
        let order: Vec<String> = f.lifecycle.calls().into_iter().map(|c| c.2).collect();
        let expected: Vec<String> = (0..7).map(|i| format!("c-{}", i)).collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn test_not_primary_touches_nothing() {
        let f = fixture(
            vec![conn("c-1", "d-1", "1", STALE)],
            vec![Delegate::new("d-1", "acct-1", "1", false)],
        );
        f.leader.set_primary(false);

        assert_eq!(
            f.detector.detect_disconnections().await,
            SweepOutcome::NotPrimary
        );
        assert_eq!(f.lifecycle.call_count(), 0);
        assert!(f.repo.contains("c-1"));
    }

    #[tokio::test]
    async fn test_lifecycle_failure_still_removes_record() {
        let f = fixture_with(
            vec![conn("c-1", "d-1", "1", STALE)],
            vec![Delegate::new("d-1", "acct-1", "1", false)],
            RecordingLifecycle::new_failing(),
            500,
        );

        let r = report(f.detector.detect_disconnections().await);

        assert_eq!(r.removed, 1);
        assert_eq!(r.failed, 0);
        assert!(!f.repo.contains("c-1"));
    }

    #[tokio::test]
    async fn test_heartbeat_during_sweep_keeps_record_and_skips_notify() {
        // A heartbeat refreshes the record right after the scan returns it
        struct RefreshingRepo(Arc<InMemoryConnectionRepository>);

        #[async_trait::async_trait]
        impl ConnectionRepository for RefreshingRepo {
            async fn upsert(&self, conn: &DelegateConnection) -> Result<()> {
                self.0.upsert(conn).await
            }
            async fn find_by_id(&self, id: &str) -> Result<Option<DelegateConnection>> {
                self.0.find_by_id(id).await
            }
            async fn find_stale(
                &self,
                cutoff: i64,
                after: Option<&StaleCursor>,
                limit: usize,
            ) -> Result<Vec<DelegateConnection>> {
                let stale = self.0.find_stale(cutoff, after, limit).await?;
                for c in &stale {
                    let mut refreshed = c.clone();
                    refreshed.last_heartbeat = NOW;
                    self.0.upsert(&refreshed).await?;
                }
                Ok(stale)
            }
            async fn exists_fresh(
                &self,
                account_id: &str,
                delegate_id: &str,
                version: &str,
                cutoff: i64,
            ) -> Result<bool> {
                self.0
                    .exists_fresh(account_id, delegate_id, version, cutoff)
                    .await
            }
            async fn delete_if_stale(&self, id: &str, cutoff: i64) -> Result<bool> {
                self.0.delete_if_stale(id, cutoff).await
            }
            async fn count_live(&self, cutoff: i64) -> Result<i64> {
                self.0.count_live(cutoff).await
            }
        }

        let repo = Arc::new(InMemoryConnectionRepository::with_records(vec![conn(
            "c-1", "d-1", "1", STALE,
        )]));
        let lifecycle = Arc::new(RecordingLifecycle::new());
        let detector = DisconnectedDetector::new(
            Arc::new(RefreshingRepo(repo.clone())),
            Arc::new(MockDelegateCache::new(vec![Delegate::new(
                "d-1", "acct-1", "1", false,
            )])),
            lifecycle.clone(),
            Arc::new(FixedLeader::new(true)),
            Arc::new(FixedTimeProvider::new(NOW)),
            DetectorConfig {
                expiry: Duration::from_millis(EXPIRY_MS as u64),
                batch_size: 500,
            },
        );

        let r = report(detector.detect_disconnections().await);

        assert_eq!(r.scanned, 1);
        assert_eq!(r.skipped, 1);
        assert_eq!(r.removed, 0);
        assert_eq!(r.notified, 0);
        assert_eq!(lifecycle.call_count(), 0);
        assert!(repo.contains("c-1"));
        assert!(repo.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_is_contained() {
        let f = fixture(vec![conn("c-1", "d-1", "1", STALE)], vec![]);
        f.repo.set_fail_queries(true);

        let r = report(f.detector.detect_disconnections().await);

        assert_eq!(r, SweepReport::default());
        assert!(f.repo.contains("c-1"));
    }
}
