//! Latest-result slot
//!
//! Single-writer, multi-reader cell holding the newest encoded result. The
//! lock is only held to swap or clone the value; cloning is cheap because the
//! payload is `Bytes`.

use std::sync::{Mutex, MutexGuard};

use crate::media::EncodedResult;

/// Holds the most recent non-empty transform output
#[derive(Debug, Default)]
pub struct LatestResultSlot {
    latest: Mutex<Option<EncodedResult>>,
}

impl LatestResultSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<EncodedResult>> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the stored result unconditionally
    pub fn publish(&self, result: EncodedResult) {
        *self.lock() = Some(result);
    }

    /// Copy the stored result; the lock is released on return
    pub fn snapshot(&self) -> Option<EncodedResult> {
        self.lock().clone()
    }

    /// Check if a result has been published
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::media::Frame;

    fn result(seq: u64, data: &'static [u8]) -> EncodedResult {
        let frame = Frame::new(Bytes::new(), 0, 0).with_sequence(seq);
        EncodedResult::for_frame(&frame, Bytes::from_static(data))
    }

    #[test]
    fn test_starts_empty() {
        let slot = LatestResultSlot::new();
        assert!(slot.is_empty());
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn test_publish_overwrites() {
        let slot = LatestResultSlot::new();
        slot.publish(result(1, b"one"));
        slot.publish(result(2, b"two"));

        let latest = slot.snapshot().unwrap();
        assert_eq!(latest.frame_sequence, 2);
        assert_eq!(latest.data, Bytes::from_static(b"two"));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let slot = Arc::new(LatestResultSlot::new());
        slot.publish(result(1, b"one"));

        let held = slot.snapshot().unwrap();
        slot.publish(result(2, b"two"));

        assert_eq!(held.frame_sequence, 1);
        assert_eq!(slot.snapshot().unwrap().frame_sequence, 2);
    }
}
