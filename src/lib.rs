//! Live video relay
//!
//! Pulls frames from an unreliable live source, runs each through a
//! pluggable transform, and pushes the newest result to every connected
//! WebSocket subscriber at a fixed rate.
//!
//! Freshness wins over completeness everywhere: the hand-off buffer drops
//! its oldest frame when full, the result slot keeps only the newest output,
//! and a subscriber that cannot keep up is dropped rather than waited for.
//!
//! # Example
//! ```no_run
//! use frame_relay::media::{AnnotatingTransform, NoopDetector};
//! use frame_relay::server::RelayServer;
//! use frame_relay::source::PatternSource;
//! use frame_relay::{Relay, RelayConfig};
//!
//! # async fn example() -> frame_relay::Result<()> {
//! let config = RelayConfig::default().source_url("pattern://640x360");
//! let transform = AnnotatingTransform::new(NoopDetector, config.transform_config());
//! let relay = Relay::start(&config, PatternSource::new(640, 360), transform)?;
//!
//! let server = RelayServer::new(&config, relay.registry().clone());
//! server.run_until(relay.stop_signal()).await?;
//! relay.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod registry;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod source;
pub mod stats;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use relay::{Relay, RelayHandle, SharedState};
pub use shutdown::{Shutdown, StopSignal};
