//! Frame and result types
//!
//! A [`Frame`] is one decoded image pulled from the source; an
//! [`EncodedResult`] is what the transform hands to the broadcaster.
//! Both hold their payload in `Bytes`, so moving them between the
//! ingestion thread, the processing worker and the subscribers only bumps
//! a reference count.

use std::time::{Duration, Instant};

use bytes::Bytes;

/// Bytes per pixel of the packed RGB24 layout used by every frame
pub const RGB_CHANNELS: usize = 3;

/// A captured frame
///
/// Pixels are packed RGB24, row-major, no padding between rows.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data
    pub payload: Bytes,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Capture instant
    pub captured_at: Instant,
    /// Monotonic capture counter assigned by the source connection
    pub sequence: u64,
}

impl Frame {
    /// Create a frame captured now
    pub fn new(payload: Bytes, width: u32, height: u32) -> Self {
        Self {
            payload,
            width,
            height,
            captured_at: Instant::now(),
            sequence: 0,
        }
    }

    /// Set the sequence number
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Expected payload length for the frame dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * RGB_CHANNELS
    }

    /// Check that the payload matches the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.payload.len() == self.expected_len()
    }

    /// Time since capture
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// A non-empty transform output ready for delivery
///
/// The "empty" outcome of a transform is expressed as `Option::None` and is
/// never stored, so every value of this type is deliverable.
#[derive(Debug, Clone)]
pub struct EncodedResult {
    /// Encoded payload (JPEG for the bundled transform)
    pub data: Bytes,
    /// Sequence number of the source frame
    pub frame_sequence: u64,
    /// Capture instant of the source frame
    pub captured_at: Instant,
}

impl EncodedResult {
    /// Wrap transform output for `frame`
    pub fn for_frame(frame: &Frame, data: Bytes) -> Self {
        Self {
            data,
            frame_sequence: frame.sequence,
            captured_at: frame.captured_at,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
