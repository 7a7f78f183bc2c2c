//! Relay configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::media::TransformConfig;
use crate::registry::store::DEFAULT_SUBSCRIBER_BUFFER;

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address of the live video source
    pub source_url: String,

    /// Fixed sleep between failed connect/read attempts
    pub reconnect_backoff: Duration,

    /// Location of the detection model asset
    pub model_path: PathBuf,

    /// Minimum detection confidence to annotate
    pub confidence_threshold: f32,

    /// Maximum frame width before the transform (downscale only)
    pub resize_width: Option<u32>,

    /// Hand-off buffer capacity
    pub queue_size: usize,

    /// Ingestion and delivery rate (frames/sec)
    pub target_fps: u32,

    /// JPEG quality of delivered frames, 1..=100
    pub jpeg_quality: u8,

    /// Stamp the wall-clock time on delivered frames
    pub timestamp: bool,

    /// Address to bind the delivery server to
    pub bind_addr: SocketAddr,

    /// Front-end assets served under `/static`
    pub static_dir: PathBuf,

    /// A subscriber whose socket does not take a frame within this time is
    /// disconnected
    pub write_timeout: Duration,

    /// Per-subscriber outbound queue depth
    pub subscriber_buffer: usize,

    /// Upper bound on each context's join during shutdown
    pub shutdown_timeout: Duration,

    /// Stats log interval
    pub stats_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            source_url: "rtsp://127.0.0.1:554/stream1".into(),
            reconnect_backoff: Duration::from_secs(3),
            model_path: PathBuf::from("models/best.onnx"),
            confidence_threshold: 0.4,
            resize_width: Some(960),
            queue_size: 2,
            target_fps: 75,
            jpeg_quality: 80,
            timestamp: true,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            static_dir: PathBuf::from("static"),
            write_timeout: Duration::from_secs(1),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            shutdown_timeout: Duration::from_secs(5),
            stats_interval: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    /// Set the source URL
    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    /// Set the reconnect backoff
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Set the buffer capacity
    pub fn queue_size(mut self, size: usize) -> Self {
        self.queue_size = size;
        self
    }

    /// Set the target frame rate
    pub fn target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the socket write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Settings for the bundled transform
    pub fn transform_config(&self) -> TransformConfig {
        TransformConfig {
            resize_width: self.resize_width,
            confidence_threshold: self.confidence_threshold,
            jpeg_quality: self.jpeg_quality,
            timestamp: self.timestamp,
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(Error::Config("queue size must be at least 1".into()));
        }
        if self.target_fps == 0 {
            return Err(Error::Config("target fps must be at least 1".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "JPEG quality {} outside 1..=100",
                self.jpeg_quality
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence threshold {} outside 0..=1",
                self.confidence_threshold
            )));
        }
        if self.resize_width == Some(0) {
            return Err(Error::Config("resize width must be positive".into()));
        }
        if self.subscriber_buffer == 0 {
            return Err(Error::Config("subscriber buffer must be at least 1".into()));
        }
        Ok(())
    }
}
