//! Source connection state machine
//!
//! Keeps a best-effort connection to an unreliable capture device and feeds
//! the hand-off buffer at the target rate.
//!
//! ```text
//!                 open ok                  read ok (push, pace)
//!  Disconnected ──────────► Connecting ──────────► Streaming ◄──┐
//!       ▲      open failed      │                     │  └──────┘
//!       └───────────────────────┘                     │
//!       ▲           (sleep backoff)                   │ read failed / no data
//!       └─────────────────────────────────────────────┘ (release, sleep backoff)
//! ```
//!
//! Retries never give up and the backoff never grows. The only exit is the
//! stop signal, checked once per cycle.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::media::{Frame, FrameBuffer, PushOutcome};
use crate::pipeline::Pacer;
use crate::shutdown::StopSignal;
use crate::stats::PipelineStats;

use super::{Capture, FrameSource};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No capture handle
    Disconnected,
    /// Open in progress
    Connecting,
    /// Capture open, reading frames
    Streaming,
}

/// What one cycle of the loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A frame was read and pushed
    Pushed {
        /// The buffer was full and dropped its oldest frame
        evicted: bool,
        /// Time spent since the read started
        elapsed: Duration,
    },
    /// The open attempt failed
    OpenFailed,
    /// The read failed or returned no data; the capture was released
    ReadFailed,
}

type TransitionObserver = Box<dyn FnMut(ConnectionState, ConnectionState) + Send>;

/// Reconnecting ingestion loop around a [`FrameSource`]
pub struct SourceConnection<S: FrameSource> {
    source: S,
    capture: Option<S::Capture>,
    state: ConnectionState,
    buffer: Arc<FrameBuffer<Frame>>,
    stats: Arc<PipelineStats>,
    reconnect_backoff: Duration,
    pacer: Pacer,
    /// Consecutive failed open attempts
    failed_attempts: u64,
    next_sequence: u64,
    observer: Option<TransitionObserver>,
}

impl<S: FrameSource> SourceConnection<S> {
    /// Create a disconnected connection
    pub fn new(
        source: S,
        buffer: Arc<FrameBuffer<Frame>>,
        stats: Arc<PipelineStats>,
        reconnect_backoff: Duration,
        period: Duration,
    ) -> Self {
        Self {
            source,
            capture: None,
            state: ConnectionState::Disconnected,
            buffer,
            stats,
            reconnect_backoff,
            pacer: Pacer::new(period),
            failed_attempts: 0,
            next_sequence: 0,
            observer: None,
        }
    }

    /// Call `observer(from, to)` on every state change
    pub fn on_transition(
        mut self,
        observer: impl FnMut(ConnectionState, ConnectionState) + Send + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        self.state = to;
        if let Some(observer) = self.observer.as_mut() {
            observer(from, to);
        }
    }

    fn release(&mut self) {
        // Drop releases the device
        self.capture = None;
    }

    fn connect(&mut self) -> bool {
        self.transition(ConnectionState::Connecting);
        PipelineStats::incr(&self.stats.connect_attempts);

        match self.source.open() {
            Ok(capture) => {
                self.capture = Some(capture);
                self.transition(ConnectionState::Streaming);
                tracing::info!(
                    stage = "ingest",
                    source = %self.source.describe(),
                    attempt = self.failed_attempts + 1,
                    "Source connected"
                );
                self.failed_attempts = 0;
                true
            }
            Err(e) => {
                self.failed_attempts += 1;
                self.transition(ConnectionState::Disconnected);
                tracing::warn!(
                    stage = "ingest",
                    source = %self.source.describe(),
                    attempt = self.failed_attempts,
                    backoff_ms = self.reconnect_backoff.as_millis() as u64,
                    error = %e,
                    "Failed to connect, retrying"
                );
                false
            }
        }
    }

    fn read_failed(&mut self, reason: &str) -> CycleOutcome {
        tracing::warn!(
            stage = "ingest",
            source = %self.source.describe(),
            reason = reason,
            backoff_ms = self.reconnect_backoff.as_millis() as u64,
            "Read failed, reconnecting"
        );
        self.release();
        self.transition(ConnectionState::Disconnected);
        PipelineStats::incr(&self.stats.reconnects);
        CycleOutcome::ReadFailed
    }

    /// Run one cycle: connect if needed, then read and push one frame
    pub fn cycle(&mut self) -> CycleOutcome {
        if self.state != ConnectionState::Streaming && !self.connect() {
            return CycleOutcome::OpenFailed;
        }

        self.pacer.start_cycle();
        let Some(capture) = self.capture.as_mut() else {
            return self.read_failed("capture handle missing");
        };

        let frame = match capture.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => return self.read_failed("no data"),
            Err(e) => return self.read_failed(&e.to_string()),
        };

        let frame = frame.with_sequence(self.next_sequence);
        self.next_sequence += 1;
        PipelineStats::incr(&self.stats.frames_captured);

        let evicted = self.buffer.push(frame) == PushOutcome::EvictedOldest;
        if evicted {
            PipelineStats::incr(&self.stats.frames_evicted);
        }

        CycleOutcome::Pushed {
            evicted,
            elapsed: self.pacer.elapsed(),
        }
    }

    /// How long to wait after `outcome` before the next cycle
    pub fn pause_after(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::Pushed { elapsed, .. } => {
                self.pacer.sleep_after(*elapsed).unwrap_or(Duration::ZERO)
            }
            CycleOutcome::OpenFailed | CycleOutcome::ReadFailed => self.reconnect_backoff,
        }
    }

    /// Run until stop is requested. Blocks the calling thread.
    pub fn run(mut self, stop: StopSignal) {
        tracing::info!(stage = "ingest", source = %self.source.describe(), "Ingestion started");

        while !stop.is_stopped() {
            let outcome = self.cycle();
            let pause = self.pause_after(&outcome);
            if stop.wait_timeout(pause) {
                break;
            }
        }

        self.release();
        if self.state != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected);
        }
        tracing::info!(stage = "ingest", "Ingestion stopped");
    }

    /// Run on a dedicated OS thread
    ///
    /// Captures are opened on that thread and never leave it, so they need
    /// not be `Send`. A capture open at the time of the call is released
    /// here and the thread starts disconnected.
    pub fn spawn(self, stop: StopSignal) -> std::io::Result<JoinHandle<()>> {
        let Self {
            source,
            capture,
            state: _,
            buffer,
            stats,
            reconnect_backoff,
            pacer,
            failed_attempts,
            next_sequence,
            observer,
        } = self;
        drop(capture);

        std::thread::Builder::new()
            .name("frame-ingest".into())
            .spawn(move || {
                let connection = Self {
                    source,
                    capture: None,
                    state: ConnectionState::Disconnected,
                    buffer,
                    stats,
                    reconnect_backoff,
                    pacer,
                    failed_attempts,
                    next_sequence,
                    observer,
                };
                connection.run(stop)
            })
    }
}
