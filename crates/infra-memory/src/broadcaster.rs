// In-process pub/sub over tokio broadcast channels

use async_trait::async_trait;
use dispatch_core::domain::DelegateTaskBroadcast;
use dispatch_core::error::Result;
use dispatch_core::port::{BroadcastChannel, BroadcastTransport};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CHANNEL_CAPACITY: usize = 128;

/// One named topic
pub struct InMemoryChannel {
    name: String,
    sender: broadcast::Sender<DelegateTaskBroadcast>,
}

impl InMemoryChannel {
    fn new(name: &str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            name: name.to_string(),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DelegateTaskBroadcast> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl BroadcastChannel for InMemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, message: &DelegateTaskBroadcast) -> Result<usize> {
        if self.sender.receiver_count() == 0 {
            debug!(channel = %self.name, task_id = %message.task_id, "No subscribers on channel");
            return Ok(0);
        }
        // send fails only when every receiver dropped after the check above
        Ok(self.sender.send(message.clone()).unwrap_or(0))
    }
}

/// Channel registry keyed by topic name.
/// Channels without subscribers are dropped when a new channel is created.
pub struct InMemoryBroadcaster {
    channels: RwLock<HashMap<String, Arc<InMemoryChannel>>>,
    capacity: usize,
}

impl InMemoryBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Per-channel buffer; slow subscribers lag past this many messages
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a channel, creating it when absent
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<DelegateTaskBroadcast> {
        // The receiver must exist before the registry lock is released
        let existing = self.channels.read().unwrap().get(channel).map(|c| c.subscribe());
        let receiver = existing.unwrap_or_else(|| {
            let mut channels = self.channels.write().unwrap();
            self.get_or_create(&mut channels, channel).subscribe()
        });
        debug!(channel = %channel, "Channel subscribed");
        receiver
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().unwrap().len()
    }

    fn channel(&self, name: &str) -> Arc<InMemoryChannel> {
        if let Some(existing) = self.channels.read().unwrap().get(name) {
            return existing.clone();
        }
        let mut channels = self.channels.write().unwrap();
        self.get_or_create(&mut channels, name)
    }

    fn get_or_create(
        &self,
        channels: &mut HashMap<String, Arc<InMemoryChannel>>,
        name: &str,
    ) -> Arc<InMemoryChannel> {
        if let Some(existing) = channels.get(name) {
            return existing.clone();
        }

        let before = channels.len();
        channels.retain(|_, c| c.receiver_count() > 0);
        if channels.len() < before {
            debug!(pruned = before - channels.len(), "Idle channels pruned");
        }

        let channel = Arc::new(InMemoryChannel::new(name, self.capacity));
        channels.insert(name.to_string(), channel.clone());
        channel
    }
}

impl Default for InMemoryBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastTransport for InMemoryBroadcaster {
    fn lookup(&self, channel: &str, create_if_absent: bool) -> Option<Arc<dyn BroadcastChannel>> {
        if create_if_absent {
            return Some(self.channel(channel) as Arc<dyn BroadcastChannel>);
        }
        self.channels
            .read()
            .unwrap()
            .get(channel)
            .map(|c| c.clone() as Arc<dyn BroadcastChannel>)
    }
}
