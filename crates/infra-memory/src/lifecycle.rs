// Delegate lifecycle notifications as an in-process event stream

use async_trait::async_trait;
use dispatch_core::error::Result;
use dispatch_core::port::DelegateLifecycle;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelegateLifecycleEvent {
    Disconnected {
        account_id: String,
        delegate_id: String,
        connection_id: String,
    },
}

/// Fans lifecycle events out to every subscriber
///
/// Consumers see repeated `Disconnected` events for the same delegate and
/// must treat them idempotently.
pub struct LifecycleEventBus {
    sender: broadcast::Sender<DelegateLifecycleEvent>,
}

impl LifecycleEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DelegateLifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for LifecycleEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DelegateLifecycle for LifecycleEventBus {
    async fn on_disconnected(
        &self,
        account_id: &str,
        delegate_id: &str,
        connection_id: &str,
    ) -> Result<()> {
        let event = DelegateLifecycleEvent::Disconnected {
            account_id: account_id.to_string(),
            delegate_id: delegate_id.to_string(),
            connection_id: connection_id.to_string(),
        };

        match self.sender.send(event) {
            Ok(receivers) => info!(
                account_id = %account_id,
                delegate_id = %delegate_id,
                receivers,
                "Delegate disconnect published"
            ),
            Err(_) => debug!(
                delegate_id = %delegate_id,
                "No lifecycle subscribers for disconnect"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_disconnects() {
        let bus = LifecycleEventBus::new();
        let mut rx = bus.subscribe();

        bus.on_disconnected("acct-1", "d-1", "c-1").await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            DelegateLifecycleEvent::Disconnected {
                account_id: "acct-1".to_string(),
                delegate_id: "d-1".to_string(),
                connection_id: "c-1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_no_subscribers_is_ok() {
        let bus = LifecycleEventBus::new();
        tokio_test::assert_ok!(bus.on_disconnected("acct-1", "d-1", "c-1").await);
    }

    #[test]
    fn test_event_json_shape() {
        let event = DelegateLifecycleEvent::Disconnected {
            account_id: "a".to_string(),
            delegate_id: "d".to_string(),
            connection_id: "c".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "disconnected");
        assert_eq!(json["delegate_id"], "d");
    }
}
