// Broadcast Transport Port (pub/sub)

use crate::domain::DelegateTaskBroadcast;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A named pub/sub channel
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Publish a task announcement
    ///
    /// # Returns
    /// Number of subscribers the message was delivered to
    async fn publish(&self, message: &DelegateTaskBroadcast) -> Result<usize>;
}

/// Channel registry of the pub/sub transport
pub trait BroadcastTransport: Send + Sync {
    /// Look up a channel by name, creating it when `create_if_absent` is set
    fn lookup(&self, channel: &str, create_if_absent: bool) -> Option<Arc<dyn BroadcastChannel>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Records every published (channel, message) pair
    #[derive(Default)]
    pub struct RecordingTransport {
        published: Arc<Mutex<Vec<(String, DelegateTaskBroadcast)>>>,
        fail_publish: Arc<Mutex<bool>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn new_failing() -> Self {
            let transport = Self::default();
            transport.set_fail_publish(true);
            transport
        }

        pub fn set_fail_publish(&self, fail: bool) {
            *self.fail_publish.lock().unwrap() = fail;
        }

        pub fn published(&self) -> Vec<(String, DelegateTaskBroadcast)> {
            self.published.lock().unwrap().clone()
        }

        pub fn publish_count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    struct RecordingChannel {
        name: String,
        published: Arc<Mutex<Vec<(String, DelegateTaskBroadcast)>>>,
        fail_publish: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl BroadcastChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn publish(&self, message: &DelegateTaskBroadcast) -> Result<usize> {
            if *self.fail_publish.lock().unwrap() {
                return Err(AppError::Transport(format!(
                    "channel {} unavailable",
                    self.name
                )));
            }
            self.published
                .lock()
                .unwrap()
                .push((self.name.clone(), message.clone()));
            Ok(1)
        }
    }

    impl BroadcastTransport for RecordingTransport {
        fn lookup(
            &self,
            channel: &str,
            _create_if_absent: bool,
        ) -> Option<Arc<dyn BroadcastChannel>> {
            Some(Arc::new(RecordingChannel {
                name: channel.to_string(),
                published: Arc::clone(&self.published),
                fail_publish: Arc::clone(&self.fail_publish),
            }))
        }
    }
}
