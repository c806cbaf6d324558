// Delegate Connection (heartbeat record) Domain Model

use serde::{Deserialize, Serialize};

/// Connection record ID (UUID v4)
pub type ConnectionId = String;

/// Live link between a delegate process and the control plane.
///
/// Refreshed by the delegate's heartbeats. A record that is not flagged
/// disconnected but whose heartbeat is older than the expiry threshold is
/// stale and gets resolved by the disconnection sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateConnection {
    pub id: ConnectionId,
    pub account_id: String,
    pub delegate_id: String,
    pub version: String,
    pub last_heartbeat: i64, // epoch ms
    pub disconnected: bool,
}

impl DelegateConnection {
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        delegate_id: impl Into<String>,
        version: impl Into<String>,
        last_heartbeat: i64,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            delegate_id: delegate_id.into(),
            version: version.into(),
            last_heartbeat,
            disconnected: false,
        }
    }

    /// True when the record has not been refreshed since `cutoff`
    pub fn is_stale(&self, cutoff: i64) -> bool {
        !self.disconnected && self.last_heartbeat <= cutoff
    }
}
