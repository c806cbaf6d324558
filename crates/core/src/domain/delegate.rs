// Delegate (remote worker) Domain Model

use serde::{Deserialize, Serialize};

/// Delegate identifier
pub type DelegateId = String;

/// Remote worker registered with an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    pub id: DelegateId,
    pub account_id: String,
    /// Protocol version the delegate currently reports
    pub version: String,
    /// Polling delegates pull work instead of holding a push connection
    pub polling_mode: bool,
    pub hostname: Option<String>,
}

impl Delegate {
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        version: impl Into<String>,
        polling_mode: bool,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            version: version.into(),
            polling_mode,
            hostname: None,
        }
    }
}
