//! Statistics for the relay pipeline

pub mod metrics;

pub use metrics::{PipelineStats, StatsSnapshot};

use std::sync::Arc;
use std::time::Duration;

use crate::shutdown::StopSignal;

/// Spawn a task logging a stats snapshot every `interval` until stop
pub fn spawn_reporter(
    stats: Arc<PipelineStats>,
    interval: Duration,
    stop: StopSignal,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.stopped() => break,
            }

            let s = stats.snapshot();
            tracing::info!(
                captured = s.frames_captured,
                evicted = s.frames_evicted,
                processed = s.frames_processed,
                empty = s.empty_results,
                transform_failures = s.transform_failures,
                cycles = s.broadcast_cycles,
                deliveries = s.deliveries,
                skipped = s.deliveries_skipped,
                delivery_failures = s.delivery_failures,
                reconnects = s.reconnects,
                capture_fps = s.capture_rate(),
                evicted_pct = s.eviction_ratio(),
                "Pipeline stats"
            );
        }
    })
}
