//! Subscriber registry implementation
//!
//! The set of live subscriber sinks, keyed by connection identity. Connection
//! tasks add and remove themselves at any time; the broadcaster works on a
//! snapshot so the lock is never held across a delivery.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

use super::subscriber::{SubscriberHandle, SubscriberId, Subscription};

/// Default per-subscriber queue depth
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1;

/// Concurrency-safe set of subscriber sinks
///
/// Thread-safe via `RwLock`. Snapshots (one per broadcast cycle) take the
/// read lock; register/unregister take the write lock briefly.
pub struct SubscriberRegistry {
    /// Live subscribers
    subscribers: RwLock<HashMap<SubscriberId, SubscriberHandle>>,

    /// Next identity to hand out
    next_id: AtomicU64,

    /// Queue depth of each subscriber channel
    buffer: usize,
}

impl SubscriberRegistry {
    /// Create a registry with the default per-subscriber queue depth
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Create a registry with a custom per-subscriber queue depth
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a new subscriber
    ///
    /// Returns the identity and the receiver the connection task drains.
    pub async fn register(&self, peer_addr: Option<SocketAddr>) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);

        let total = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(id, SubscriberHandle::new(id, peer_addr, tx));
            subscribers.len()
        };

        tracing::info!(
            subscriber = %id,
            peer = ?peer_addr,
            total = total,
            "Subscriber connected"
        );

        Subscription { id, rx }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, total) = {
            let mut subscribers = self.subscribers.write().await;
            let removed = subscribers.remove(&id);
            (removed, subscribers.len())
        };

        match removed {
            Some(handle) => {
                tracing::info!(
                    subscriber = %id,
                    connected_secs = handle.connected_at.elapsed().as_secs(),
                    total = total,
                    "Subscriber disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Remove several subscribers under one lock. Returns how many were present.
    pub async fn remove_many(&self, ids: &[SubscriberId]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let (removed, total) = {
            let mut subscribers = self.subscribers.write().await;
            let removed = ids
                .iter()
                .filter(|id| subscribers.remove(*id).is_some())
                .count();
            (removed, subscribers.len())
        };

        tracing::debug!(pruned = removed, total = total, "Pruned failed subscribers");
        removed
    }

    /// Copy of the current subscriber set
    pub async fn snapshot(&self) -> Vec<SubscriberHandle> {
        self.subscribers.read().await.values().cloned().collect()
    }

    /// Check if a subscriber is registered
    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().await.contains_key(&id)
    }

    /// Number of subscribers
    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Check if there are no subscribers
    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
