// Single-node primary

use async_trait::async_trait;
use dispatch_core::port::LeaderElection;

/// Leader election for deployments with exactly one process
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPrimary;

#[async_trait]
impl LeaderElection for AlwaysPrimary {
    async fn is_primary(&self) -> bool {
        true
    }
}
