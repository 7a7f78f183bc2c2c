//! Subscriber handle types
//!
//! A subscriber is represented in the registry by the sending half of a small
//! bounded channel. The connection task owns the receiving half and writes
//! whatever arrives to the socket; when that task ends the channel closes and
//! the next delivery fails.
//!
//! Delivery never waits. A subscriber whose queue is still full from an
//! earlier cycle is skipped for this one; it catches up with whatever is
//! newest once its connection task drains the queue.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::error::DeliveryError;

/// Connection identity of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sink handle for one connected subscriber
///
/// Cheap to clone; the broadcaster works on clones taken from a registry
/// snapshot.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    /// Subscriber identity
    pub id: SubscriberId,
    /// Remote address, if known
    pub peer_addr: Option<SocketAddr>,
    /// When the subscriber registered
    pub connected_at: Instant,
    tx: mpsc::Sender<Bytes>,
}

impl SubscriberHandle {
    pub(super) fn new(id: SubscriberId, peer_addr: Option<SocketAddr>, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            tx,
        }
    }

    /// Queue `payload` for the subscriber's connection task without waiting
    pub fn deliver(&self, payload: Bytes) -> Result<Delivery, DeliveryError> {
        match self.tx.try_send(payload) {
            Ok(()) => Ok(Delivery::Sent),
            Err(TrySendError::Full(_)) => Ok(Delivery::Skipped),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed(self.id)),
        }
    }
}

/// Result of a successful delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Payload queued
    Sent,
    /// Queue still held an undelivered payload; this one was not queued
    Skipped,
}

/// Receiving side handed to the connection task on registration
#[derive(Debug)]
pub struct Subscription {
    /// Identity to unregister with
    pub id: SubscriberId,
    /// Payloads to write to the subscriber
    pub rx: mpsc::Receiver<Bytes>,
}
