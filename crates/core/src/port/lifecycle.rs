// Delegate Lifecycle Port - downstream reaction to delegate disconnects

use crate::error::Result;
use async_trait::async_trait;

/// Delegate lifecycle service
///
/// Implementations must tolerate repeated notifications for the same
/// delegate; the disconnection sweep does not deduplicate.
#[async_trait]
pub trait DelegateLifecycle: Send + Sync {
    async fn on_disconnected(
        &self,
        account_id: &str,
        delegate_id: &str,
        connection_id: &str,
    ) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Records (account, delegate, connection) triples
    #[derive(Default)]
    pub struct RecordingLifecycle {
        calls: Mutex<Vec<(String, String, String)>>,
        fail: Mutex<bool>,
    }

    impl RecordingLifecycle {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn new_failing() -> Self {
            let lifecycle = Self::default();
            *lifecycle.fail.lock().unwrap() = true;
            lifecycle
        }

        pub fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DelegateLifecycle for RecordingLifecycle {
        async fn on_disconnected(
            &self,
            account_id: &str,
            delegate_id: &str,
            connection_id: &str,
        ) -> Result<()> {
            self.calls.lock().unwrap().push((
                account_id.to_string(),
                delegate_id.to_string(),
                connection_id.to_string(),
            ));
            if *self.fail.lock().unwrap() {
                return Err(AppError::Internal("lifecycle service unavailable".to_string()));
            }
            Ok(())
        }
    }
}
