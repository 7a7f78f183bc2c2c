//! Delivery server
//!
//! Subscribers connect over WebSocket at `/ws` and receive every broadcast
//! payload as a binary message.

pub mod connection;
pub mod listener;

pub use connection::CloseReason;
pub use listener::RelayServer;
