//! Delivery error types
//!
//! Error types for per-subscriber delivery.

use thiserror::Error;

use super::subscriber::SubscriberId;

/// Error type for a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The subscriber's connection task has gone away
    #[error("Subscriber {0} closed")]
    Closed(SubscriberId),
}

impl DeliveryError {
    /// The subscriber this error belongs to
    pub fn subscriber(&self) -> SubscriberId {
        match self {
            DeliveryError::Closed(id) => *id,
        }
    }
}
