//! Frame sources
//!
//! This module provides:
//! - The [`FrameSource`] / [`Capture`] backend contract
//! - [`SourceConnection`], the reconnecting ingestion state machine
//! - [`PatternSource`], a synthetic source for demos and tests
//! - `FfmpegSource` (feature `ffmpeg`) for RTSP and anything else ffmpeg opens

pub mod connection;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod pattern;

pub use connection::{ConnectionState, CycleOutcome, SourceConnection};
#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg::FfmpegSource;
pub use pattern::PatternSource;

use crate::error::Result;
use crate::media::Frame;

/// An open capture handle. Dropping it releases the device.
///
/// Only ever used on the thread that opened it.
pub trait Capture {
    /// Read the next frame. `Ok(None)` means the stream produced no data,
    /// which is handled like a read failure.
    fn read(&mut self) -> Result<Option<Frame>>;
}

/// Something that can be (re)opened into a [`Capture`]
pub trait FrameSource: Send + 'static {
    type Capture: Capture;

    /// Attempt to open the device
    fn open(&mut self) -> Result<Self::Capture>;

    /// Human-readable address for logs
    fn describe(&self) -> String;
}
