// Leader Election Port - primary-only gate for cluster-wide sweeps

use async_trait::async_trait;

/// Answers whether this process is currently the elected primary
#[async_trait]
pub trait LeaderElection: Send + Sync {
    async fn is_primary(&self) -> bool;
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Primary flag toggled by the test
    pub struct FixedLeader {
        primary: AtomicBool,
        checks: AtomicUsize,
    }

    impl FixedLeader {
        pub fn new(primary: bool) -> Self {
            Self {
                primary: AtomicBool::new(primary),
                checks: AtomicUsize::new(0),
            }
        }

        pub fn set_primary(&self, primary: bool) {
            self.primary.store(primary, Ordering::SeqCst);
        }

        pub fn check_count(&self) -> usize {
            self.checks.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LeaderElection for FixedLeader {
        async fn is_primary(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.primary.load(Ordering::SeqCst)
        }
    }
}
