//! Delivery server
//!
//! HTTP front door of the relay: the WebSocket push endpoint, a landing page
//! and the bundled front-end assets.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::RelayConfig;
use crate::error::Result;
use crate::registry::SubscriberRegistry;
use crate::shutdown::StopSignal;

use super::connection;

const LANDING_PAGE: &str =
    "<h3>Relay running. Open <a href='/static/index.html'>/static/index.html</a></h3>";

/// Shared state passed to request handlers
#[derive(Clone)]
struct AppState {
    registry: Arc<SubscriberRegistry>,
    write_timeout: Duration,
    stop: StopSignal,
}

/// WebSocket delivery server
pub struct RelayServer {
    bind_addr: SocketAddr,
    static_dir: PathBuf,
    write_timeout: Duration,
    registry: Arc<SubscriberRegistry>,
}

impl RelayServer {
    /// Create a server registering subscribers into `registry`
    pub fn new(config: &RelayConfig, registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            bind_addr: config.bind_addr,
            static_dir: config.static_dir.clone(),
            write_timeout: config.write_timeout,
            registry,
        }
    }

    /// Build the router
    pub fn router(&self, stop: StopSignal) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            write_timeout: self.write_timeout,
            stop,
        };

        Router::new()
            .route("/", get(landing_page))
            .route("/ws", get(handle_websocket))
            .nest_service("/static", ServeDir::new(&self.static_dir))
            .with_state(state)
    }

    /// Bind the configured address and serve until stop
    pub async fn run_until(&self, stop: StopSignal) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener, stop).await
    }

    /// Serve on an already bound listener until stop
    pub async fn serve(&self, listener: TcpListener, stop: StopSignal) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Relay server listening");

        let app = self.router(stop.clone());
        let shutdown = async move {
            stop.stopped().await;
            tracing::info!("Shutdown signal received");
        };

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        Ok(())
    }

}

async fn landing_page() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn handle_websocket(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        connection::serve(
            socket,
            peer_addr,
            state.registry,
            state.write_timeout,
            state.stop,
        )
        .await;
    })
    .into_response()
}
