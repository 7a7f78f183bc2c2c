//! Error types
//!
//! Recoverable pipeline failures are logged where they happen and never leave
//! the stage that produced them. This type carries the failures that do cross
//! an API boundary: capture backends, transforms, configuration and startup.

use thiserror::Error;

/// Error type for relay operations
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O error (socket bind, file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The capture device could not be opened
    #[error("failed to open source {url}: {reason}")]
    SourceOpen { url: String, reason: String },

    /// A read from an open capture failed mid-session
    #[error("source read failed: {0}")]
    SourceRead(String),

    /// The per-frame transform failed
    #[error("transform failed: {0}")]
    Transform(String),

    /// Image encode/decode error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_source_open() {
        let err = Error::SourceOpen {
            url: "rtsp://cam/stream1".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to open source rtsp://cam/stream1: connection refused"
        );
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
