//! frame-relay binary
//!
//! Run with: cargo run -- [OPTIONS]
//!
//! Examples:
//!   frame-relay --source-url pattern://640x360          # synthetic source
//!   frame-relay --source-url rtsp://cam/stream1         # needs `--features ffmpeg`
//!   frame-relay --no-source                             # server only
//!
//! Then open http://localhost:8001/static/index.html

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use frame_relay::media::{AnnotatingTransform, NoopDetector};
use frame_relay::server::RelayServer;
use frame_relay::source::PatternSource;
use frame_relay::{Error, Relay, RelayConfig, RelayHandle, Result};

/// Live video relay: ingest, annotate, fan out over WebSocket
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Address of the live video source (`pattern://WxH` for a test pattern)
    #[arg(long, env = "RELAY_SOURCE_URL", default_value = "pattern://640x360")]
    source_url: String,

    /// Run the server without ingestion
    #[arg(long, env = "RELAY_NO_SOURCE")]
    no_source: bool,

    /// Seconds to wait between failed connect/read attempts
    #[arg(long, env = "RELAY_RECONNECT_BACKOFF", default_value_t = 3.0)]
    reconnect_backoff: f64,

    /// Detection model asset
    #[arg(long, env = "RELAY_MODEL_PATH", default_value = "models/best.onnx")]
    model_path: PathBuf,

    /// Minimum detection confidence to annotate
    #[arg(long, env = "RELAY_CONF_THRESHOLD", default_value_t = 0.4)]
    conf_threshold: f32,

    /// Maximum frame width before the transform (0 disables resizing)
    #[arg(long, env = "RELAY_RESIZE_WIDTH", default_value_t = 960)]
    resize_width: u32,

    /// Hand-off buffer capacity
    #[arg(long, env = "RELAY_QUEUE_SIZE", default_value_t = 2)]
    queue_size: usize,

    /// Ingestion and delivery rate (frames/sec)
    #[arg(long, env = "RELAY_TARGET_FPS", default_value_t = 75)]
    target_fps: u32,

    /// JPEG quality of delivered frames
    #[arg(long, env = "RELAY_JPEG_QUALITY", default_value_t = 80)]
    jpeg_quality: u8,

    /// Do not stamp the time on delivered frames
    #[arg(long, env = "RELAY_NO_TIMESTAMP")]
    no_timestamp: bool,

    /// Listen host
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port
    #[arg(long, env = "RELAY_PORT", default_value_t = 8001)]
    port: u16,

    /// Directory served under /static
    #[arg(long, env = "RELAY_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,
}

impl Cli {
    async fn into_config(self) -> Result<RelayConfig> {
        if !self.reconnect_backoff.is_finite() || self.reconnect_backoff < 0.0 {
            return Err(Error::Config(format!(
                "invalid reconnect backoff: {}",
                self.reconnect_backoff
            )));
        }

        let bind_addr = resolve(&self.host, self.port).await?;

        Ok(RelayConfig {
            source_url: self.source_url,
            reconnect_backoff: Duration::from_secs_f64(self.reconnect_backoff),
            model_path: self.model_path,
            confidence_threshold: self.conf_threshold,
            resize_width: (self.resize_width > 0).then_some(self.resize_width),
            queue_size: self.queue_size,
            target_fps: self.target_fps,
            jpeg_quality: self.jpeg_quality,
            timestamp: !self.no_timestamp,
            bind_addr,
            static_dir: self.static_dir,
            ..RelayConfig::default()
        })
    }
}

/// Resolve the listen host, preferring IPv4 when a name maps to several
async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::Config(format!("cannot resolve host '{}': {}", host, e)))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::Config(format!("host '{}' resolved to no addresses", host)))
}

fn start_relay(config: &RelayConfig, no_source: bool) -> Result<RelayHandle> {
    tracing::info!(
        model = %config.model_path.display(),
        "No detector backend compiled in; frames are annotated without detections"
    );
    let transform = AnnotatingTransform::new(NoopDetector, config.transform_config());

    if no_source {
        tracing::info!("Running without a source; the server starts without ingestion");
        return Relay::start_without_source(config, transform);
    }

    if PatternSource::handles(&config.source_url) {
        let source = PatternSource::from_url(&config.source_url)?;
        return Relay::start(config, source, transform);
    }

    #[cfg(feature = "ffmpeg")]
    {
        let source = frame_relay::source::FfmpegSource::new(config.source_url.clone());
        Relay::start(config, source, transform)
    }

    #[cfg(not(feature = "ffmpeg"))]
    {
        tracing::warn!(
            source = %config.source_url,
            "Built without the `ffmpeg` feature; only pattern:// sources are available. \
             Running without ingestion"
        );
        Relay::start_without_source(config, transform)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("frame_relay=info")),
        )
        .init();

    let cli = Cli::parse();
    let no_source = cli.no_source;
    let config = match cli.into_config().await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let relay = match start_relay(&config, no_source) {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start pipeline");
            return ExitCode::FAILURE;
        }
    };

    let server = RelayServer::new(&config, relay.registry().clone());
    let stop = relay.stop_signal();
    let mut server_task = tokio::spawn(async move { server.run_until(stop).await });

    let early_exit = tokio::select! {
        result = &mut server_task => Some(result),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down");
            None
        }
    };

    // Stopping the relay also stops the server
    relay.shutdown().await;

    let result = match early_exit {
        Some(result) => result,
        None => server_task.await,
    };

    match result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Server task failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["frame-relay"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn test_defaults() {
        let config = cli(&[]).into_config().await.unwrap();
        assert_eq!(config.target_fps, 75);
        assert_eq!(config.bind_addr, "0.0.0.0:8001".parse().unwrap());
        assert!(config.timestamp);
    }

    #[tokio::test]
    async fn test_localhost_resolved() {
        let config = cli(&["--host", "localhost", "--port", "9100"])
            .into_config()
            .await
            .unwrap();
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.bind_addr.port(), 9100);
    }

    #[tokio::test]
    async fn test_negative_backoff_is_config_error() {
        let result = cli(&["--reconnect-backoff=-1"]).into_config().await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_config_error() {
        let result = cli(&["--host", "no such host"]).into_config().await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
