//! Best-effort fan-out of status snapshots to live observers.
//!
//! Each subscriber gets its own bounded queue. Publishing never blocks: a
//! full queue drops that update for that subscriber only.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 10;

pub type SubscriberId = u64;

#[derive(Debug)]
pub struct EventBroadcaster {
    subscribers: DashMap<SubscriberId, mpsc::Sender<String>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl EventBroadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a new observer queue. Dropping the subscription unregisters it.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, sender);
        tracing::debug!(subscriber = id, "observer subscribed");

        Subscription {
            id,
            receiver,
            broadcaster: Arc::clone(self),
        }
    }

    /// Remove and close a subscriber queue. Repeated calls are no-ops.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = id, "observer unsubscribed");
        }
        removed
    }

    /// Offer `payload` to every subscriber without waiting.
    /// Returns how many subscribers accepted it.
    pub fn publish(&self, payload: &str) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(subscriber = *entry.key(), "observer queue full, update dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        // Removal happens after iteration; DashMap shards are still read-locked inside the loop
        for id in closed {
            self.unsubscribe(id);
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Receiving end of one observer queue, owned by that observer's handler.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<String>,
    broadcaster: Arc<EventBroadcaster>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next payload. `None` once the queue has been closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let broadcaster = Arc::new(EventBroadcaster::default());
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        assert_eq!(broadcaster.publish("{\"status\":\"waiting\"}"), 2);
        assert_eq!(a.recv().await.as_deref(), Some("{\"status\":\"waiting\"}"));
        assert_eq!(b.recv().await.as_deref(), Some("{\"status\":\"waiting\"}"));
    }

    #[tokio::test]
    async fn full_queue_drops_updates_without_blocking() {
        let broadcaster = Arc::new(EventBroadcaster::new(2));
        let mut slow = broadcaster.subscribe();

        assert_eq!(broadcaster.publish("1"), 1);
        assert_eq!(broadcaster.publish("2"), 1);
        assert_eq!(broadcaster.publish("3"), 0);

        assert_eq!(slow.recv().await.as_deref(), Some("1"));
        assert_eq!(slow.recv().await.as_deref(), Some("2"));
        assert!(slow.try_recv().is_none());

        // Room again, so the next update gets through
        assert_eq!(broadcaster.publish("4"), 1);
        assert_eq!(slow.recv().await.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_starve_others() {
        let broadcaster = Arc::new(EventBroadcaster::new(1));
        let _slow = broadcaster.subscribe();
        let mut fast = broadcaster.subscribe();

        for i in 0..5 {
            broadcaster.publish(&i.to_string());
            assert_eq!(fast.recv().await, Some(i.to_string()));
        }
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let broadcaster = Arc::new(EventBroadcaster::default());
        let sub = broadcaster.subscribe();
        let id = sub.id();
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(!broadcaster.unsubscribe(id));
    }

    #[tokio::test]
    async fn explicit_unsubscribe_closes_queue() {
        let broadcaster = Arc::new(EventBroadcaster::default());
        let mut sub = broadcaster.subscribe();

        assert!(broadcaster.unsubscribe(sub.id()));
        assert!(sub.recv().await.is_none());
        assert_eq!(broadcaster.publish("late"), 0);
    }
}
