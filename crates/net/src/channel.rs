//! Channel identifiers and per-entity inbound queues.
//!
//! Receipt only ever pushes into a queue; the owning entity drains it at
//! the start of its own tick.

use std::collections::VecDeque;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Channel type identifier for message routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelType {
    /// Input messages from client to server (unreliable, latest wins).
    Input = 0,
    /// Authoritative state from server to client (unreliable, latest wins).
    State = 1,
    /// Spawn/despawn notifications (reliable, ordered).
    Lifecycle = 2,
}

impl ChannelType {
    /// Check if this channel type should use reliable delivery.
    pub fn is_reliable(&self) -> bool {
        matches!(self, ChannelType::Lifecycle)
    }

    /// Check if this channel type should use unreliable delivery.
    pub fn is_unreliable(&self) -> bool {
        !self.is_reliable()
    }
}

impl TryFrom<u8> for ChannelType {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ChannelType::Input),
            1 => Ok(ChannelType::State),
            2 => Ok(ChannelType::Lifecycle),
            _ => Err(anyhow::anyhow!("Invalid channel type: {}", value)),
        }
    }
}

/// FIFO of received messages for a single entity.
#[derive(Debug, Clone)]
pub struct InboundQueue<T> {
    messages: VecDeque<T>,
}

impl<T> Default for InboundQueue<T> {
    fn default() -> Self {
        Self {
            messages: VecDeque::new(),
        }
    }
}

impl<T> InboundQueue<T> {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a received message.
    pub fn push(&mut self, message: T) {
        self.messages.push_back(message);
    }

    /// Empty the queue, keeping only the most recently enqueued message.
    pub fn drain_latest(&mut self) -> Option<T> {
        let dropped = self.messages.len().saturating_sub(1);
        if dropped > 0 {
            trace!(dropped, "superseded messages dropped");
        }
        let latest = self.messages.pop_back();
        self.messages.clear();
        latest
    }

    /// Empty the queue in arrival order (reliable channels).
    pub fn drain_all(&mut self) -> impl Iterator<Item = T> + '_ {
        self.messages.drain(..)
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_reliability() {
        assert!(ChannelType::Input.is_unreliable());
        assert!(ChannelType::State.is_unreliable());
        assert!(ChannelType::Lifecycle.is_reliable());
    }

    #[test]
    fn test_channel_type_conversion() {
        assert_eq!(ChannelType::try_from(0).unwrap(), ChannelType::Input);
        assert_eq!(ChannelType::try_from(1).unwrap(), ChannelType::State);
        assert_eq!(ChannelType::try_from(2).unwrap(), ChannelType::Lifecycle);
        assert!(ChannelType::try_from(99).is_err());
    }

    #[test]
    fn test_drain_latest_keeps_last_enqueued() {
        let mut queue = InboundQueue::new();
        queue.push(3);
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.drain_latest(), Some(2));
        assert!(queue.is_empty());
        assert_eq!(queue.drain_latest(), None);
    }

    #[test]
    fn test_drain_all_preserves_order() {
        let mut queue = InboundQueue::new();
        queue.push("spawn");
        queue.push("despawn");
        assert_eq!(queue.drain_all().collect::<Vec<_>>(), vec!["spawn", "despawn"]);
        assert_eq!(queue.len(), 0);
    }
}
