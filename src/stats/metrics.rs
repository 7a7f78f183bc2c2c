//! Pipeline counters
//!
//! Every stage bumps its own counters with relaxed atomics; nothing reads
//! them on the hot path. A reporter task snapshots and logs them
//! periodically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters shared by all pipeline stages
#[derive(Debug)]
pub struct PipelineStats {
    started_at: Instant,
    /// Frames read from the source
    pub frames_captured: AtomicU64,
    /// Frames evicted from the hand-off buffer before processing
    pub frames_evicted: AtomicU64,
    /// Frames taken off the buffer by the processing worker
    pub frames_processed: AtomicU64,
    /// Transform calls that produced the empty outcome
    pub empty_results: AtomicU64,
    /// Transform calls that failed or panicked
    pub transform_failures: AtomicU64,
    /// Broadcast cycles run
    pub broadcast_cycles: AtomicU64,
    /// Successful per-subscriber deliveries
    pub deliveries: AtomicU64,
    /// Deliveries skipped because the subscriber had not drained the last one
    pub deliveries_skipped: AtomicU64,
    /// Failed per-subscriber deliveries (each prunes one subscriber)
    pub delivery_failures: AtomicU64,
    /// Source open attempts
    pub connect_attempts: AtomicU64,
    /// Transitions from streaming back to disconnected
    pub reconnects: AtomicU64,
}

impl PipelineStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_captured: AtomicU64::new(0),
            frames_evicted: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            empty_results: AtomicU64::new(0),
            transform_failures: AtomicU64::new(0),
            broadcast_cycles: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            deliveries_skipped: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Add one to `counter`
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to `counter`
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy the current values
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            frames_captured: load(&self.frames_captured),
            frames_evicted: load(&self.frames_evicted),
            frames_processed: load(&self.frames_processed),
            empty_results: load(&self.empty_results),
            transform_failures: load(&self.transform_failures),
            broadcast_cycles: load(&self.broadcast_cycles),
            deliveries: load(&self.deliveries),
            deliveries_skipped: load(&self.deliveries_skipped),
            delivery_failures: load(&self.delivery_failures),
            connect_attempts: load(&self.connect_attempts),
            reconnects: load(&self.reconnects),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub frames_captured: u64,
    pub frames_evicted: u64,
    pub frames_processed: u64,
    pub empty_results: u64,
    pub transform_failures: u64,
    pub broadcast_cycles: u64,
    pub deliveries: u64,
    pub deliveries_skipped: u64,
    pub delivery_failures: u64,
    pub connect_attempts: u64,
    pub reconnects: u64,
}

impl StatsSnapshot {
    /// Average capture rate since start (frames/sec)
    pub fn capture_rate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.frames_captured as f64 / secs
        } else {
            0.0
        }
    }

    /// Share of captured frames that were evicted unprocessed, in percent
    pub fn eviction_ratio(&self) -> f32 {
        if self.frames_captured > 0 {
            (self.frames_evicted as f32 / self.frames_captured as f32) * 100.0
        } else {
            0.0
        }
    }
}
