//! Subscriber registry for result fan-out
//!
//! The registry holds one sink handle per connected subscriber. Each handle
//! is the sending half of a small bounded channel whose receiver lives in the
//! subscriber's connection task.
//!
//! # Architecture
//!
//! ```text
//!                     Arc<SubscriberRegistry>
//!                 ┌─────────────────────────────┐
//!                 │ subscribers: HashMap<Id,    │
//!                 │   SubscriberHandle { tx }   │
//!                 │ >                           │
//!                 └──────────────┬──────────────┘
//!                                │ snapshot()
//!                                ▼
//!                          [Broadcaster]
//!              deliver() to each handle, never waiting
//!                                │
//!         ┌──────────────────────┼──────────────────────┐
//!         ▼                      ▼                      ▼
//!   [Connection]           [Connection]           [Connection]
//!   rx.recv() ──► WS       rx.recv() ──► WS       rx.recv() ──► WS
//! ```
//!
//! A delivery to a closed channel removes the handle; a full channel skips
//! the cycle for that subscriber. A connection task that sees its socket
//! close, or whose socket write times out, removes itself.

pub mod error;
pub mod store;
pub mod subscriber;

pub use error::DeliveryError;
pub use store::SubscriberRegistry;
pub use subscriber::{Delivery, SubscriberHandle, SubscriberId, Subscription};
