//! Per-subscriber WebSocket connection
//!
//! Registers a sink, forwards queued payloads as binary messages, and drains
//! anything the client sends. Inbound traffic only matters as a liveness
//! signal: a close frame, a read error or EOF ends the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::registry::{SubscriberRegistry, Subscription};
use crate::shutdown::StopSignal;

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client closed or the socket reached EOF
    ClientClosed,
    /// Reading from the socket failed
    ReadFailed(String),
    /// Writing to the socket failed or timed out
    WriteFailed(String),
    /// The broadcaster pruned this subscriber
    Pruned,
    /// The relay is shutting down
    Shutdown,
}

/// Serve one subscriber until it goes away
pub async fn serve(
    socket: WebSocket,
    peer_addr: SocketAddr,
    registry: Arc<SubscriberRegistry>,
    write_timeout: Duration,
    stop: StopSignal,
) -> CloseReason {
    let Subscription { id, mut rx } = registry.register(Some(peer_addr)).await;
    let (mut sink, mut inbound) = socket.split();

    let reason = loop {
        tokio::select! {
            payload = rx.recv() => {
                let Some(payload) = payload else {
                    break CloseReason::Pruned;
                };
                match tokio::time::timeout(write_timeout, sink.send(Message::Binary(payload))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break CloseReason::WriteFailed(e.to_string()),
                    Err(_) => break CloseReason::WriteFailed("write timed out".into()),
                }
            }
            message = inbound.next() => match message {
                None | Some(Ok(Message::Close(_))) => break CloseReason::ClientClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => break CloseReason::ReadFailed(e.to_string()),
            },
            _ = stop.stopped() => break CloseReason::Shutdown,
        }
    };

    registry.unregister(id).await;

    if reason == CloseReason::Shutdown {
        let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await;
    }

    tracing::debug!(subscriber = %id, peer = %peer_addr, reason = ?reason, "Connection closed");
    reason
}
