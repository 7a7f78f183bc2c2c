//! Processing worker
//!
//! Pops frames off the hand-off buffer, runs the transform, and publishes
//! non-empty output into the latest-result slot. Exactly one worker exists
//! per pipeline, so the transform is never invoked concurrently with itself.
//!
//! The worker runs on tokio's blocking pool: both the buffer wait and the
//! transform block, and neither may stall the async tasks serving
//! subscribers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::media::{EncodedResult, Frame, FrameBuffer, Transform};
use crate::shutdown::StopSignal;
use crate::stats::PipelineStats;

use super::slot::LatestResultSlot;

/// How often an idle worker wakes up to check for stop
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of processing one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A new result was published
    Published,
    /// The transform declined the frame; the slot keeps its previous value
    Empty,
    /// The transform failed or panicked; handled like `Empty`
    Failed,
}

/// Single sequential transform worker
pub struct Processor<T: Transform> {
    buffer: Arc<FrameBuffer<Frame>>,
    slot: Arc<LatestResultSlot>,
    transform: T,
    stats: Arc<PipelineStats>,
}

impl<T: Transform> Processor<T> {
    /// Create a worker reading `buffer` and writing `slot`
    pub fn new(
        buffer: Arc<FrameBuffer<Frame>>,
        slot: Arc<LatestResultSlot>,
        transform: T,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            buffer,
            slot,
            transform,
            stats,
        }
    }

    /// Transform one frame and publish the result if there is one
    pub fn process(&mut self, frame: Frame) -> ProcessOutcome {
        PipelineStats::incr(&self.stats.frames_processed);

        if !frame.is_well_formed() {
            PipelineStats::incr(&self.stats.transform_failures);
            tracing::warn!(
                stage = "transform",
                sequence = frame.sequence,
                width = frame.width,
                height = frame.height,
                len = frame.payload.len(),
                expected = frame.expected_len(),
                "Malformed frame, skipping"
            );
            return ProcessOutcome::Failed;
        }

        let transform = &mut self.transform;
        let output = panic::catch_unwind(AssertUnwindSafe(|| transform.transform(&frame)));

        match output {
            Ok(Ok(Some(data))) if !data.is_empty() => {
                tracing::trace!(
                    sequence = frame.sequence,
                    latency_ms = frame.age().as_millis() as u64,
                    "Result published"
                );
                self.slot.publish(EncodedResult::for_frame(&frame, data));
                ProcessOutcome::Published
            }
            Ok(Ok(_)) => {
                PipelineStats::incr(&self.stats.empty_results);
                tracing::trace!(sequence = frame.sequence, "Transform produced no output");
                ProcessOutcome::Empty
            }
            Ok(Err(e)) => {
                PipelineStats::incr(&self.stats.transform_failures);
                tracing::warn!(
                    stage = "transform",
                    sequence = frame.sequence,
                    error = %e,
                    "Transform failed, skipping frame"
                );
                ProcessOutcome::Failed
            }
            Err(_) => {
                PipelineStats::incr(&self.stats.transform_failures);
                tracing::error!(
                    stage = "transform",
                    sequence = frame.sequence,
                    "Transform panicked, skipping frame"
                );
                ProcessOutcome::Failed
            }
        }
    }

    /// Run until stop is requested. Blocks the calling thread.
    pub fn run(mut self, stop: StopSignal) {
        tracing::debug!("Processing worker started");

        while !stop.is_stopped() {
            if let Some(frame) = self.buffer.pop_timeout(STOP_POLL_INTERVAL) {
                self.process(frame);
            }
        }

        tracing::debug!("Processing worker stopped");
    }

    /// Run on the blocking pool
    pub fn spawn(self, stop: StopSignal) -> tokio::task::JoinHandle<()> {
        tokio::task::spawn_blocking(move || self.run(stop))
    }
}
