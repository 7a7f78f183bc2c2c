//! Periodic fan-out
//!
//! Once per period the broadcaster snapshots the latest result and the
//! subscriber set, offers the same payload to every subscriber, and prunes
//! the ones whose connection is gone. Offering never waits: a subscriber
//! still busy with an earlier payload is skipped for this cycle, so a slow
//! reader cannot hold back the others or the cycle rate.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::{Delivery, SubscriberRegistry};
use crate::shutdown::StopSignal;
use crate::stats::PipelineStats;

use super::pacing::{frame_period, Pacer};
use super::slot::LatestResultSlot;

/// What one broadcast cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Deliveries attempted
    pub attempted: usize,
    /// Payloads queued
    pub delivered: usize,
    /// Subscribers skipped because their queue was still full
    pub skipped: usize,
    /// Subscribers removed because their connection was gone
    pub pruned: usize,
}

impl CycleReport {
    /// Check if the cycle skipped delivery entirely
    pub fn is_idle(&self) -> bool {
        self.attempted == 0
    }
}

/// Fixed-rate fan-out loop
pub struct Broadcaster {
    slot: Arc<LatestResultSlot>,
    registry: Arc<SubscriberRegistry>,
    stats: Arc<PipelineStats>,
    period: Duration,
}

impl Broadcaster {
    /// Create a broadcaster running at `fps` cycles per second
    pub fn new(
        slot: Arc<LatestResultSlot>,
        registry: Arc<SubscriberRegistry>,
        stats: Arc<PipelineStats>,
        fps: u32,
    ) -> Self {
        Self {
            slot,
            registry,
            stats,
            period: frame_period(fps),
        }
    }

    /// Run a single cycle
    pub async fn cycle(&self) -> CycleReport {
        PipelineStats::incr(&self.stats.broadcast_cycles);

        let Some(latest) = self.slot.snapshot() else {
            return CycleReport::default();
        };

        let subscribers = self.registry.snapshot().await;
        if subscribers.is_empty() {
            return CycleReport::default();
        }

        let mut report = CycleReport {
            attempted: subscribers.len(),
            ..CycleReport::default()
        };
        let mut failed = Vec::new();

        for subscriber in &subscribers {
            match subscriber.deliver(latest.data.clone()) {
                Ok(Delivery::Sent) => report.delivered += 1,
                Ok(Delivery::Skipped) => report.skipped += 1,
                Err(e) => {
                    tracing::debug!(stage = "broadcast", error = %e, "Delivery failed");
                    failed.push(e.subscriber());
                }
            }
        }

        report.pruned = self.registry.remove_many(&failed).await;

        PipelineStats::add(&self.stats.deliveries, report.delivered as u64);
        PipelineStats::add(&self.stats.deliveries_skipped, report.skipped as u64);
        PipelineStats::add(&self.stats.delivery_failures, failed.len() as u64);

        report
    }

    /// Run until stop is requested
    pub async fn run(self, stop: StopSignal) {
        let mut pacer = Pacer::new(self.period);
        tracing::debug!(period_ms = pacer.period().as_millis() as u64, "Broadcaster started");

        loop {
            if stop.is_stopped() {
                break;
            }

            pacer.start_cycle();
            let report = self.cycle().await;
            if !report.is_idle() {
                tracing::trace!(
                    delivered = report.delivered,
                    skipped = report.skipped,
                    pruned = report.pruned,
                    "Broadcast cycle"
                );
            }

            match pacer.sleep_time() {
                Some(wait) => {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = stop.stopped() => break,
                    }
                }
                // Overran the period: start the next cycle now, but let other
                // tasks run first
                None => tokio::task::yield_now().await,
            }
        }

        tracing::debug!("Broadcaster stopped");
    }

    /// Spawn on the current runtime
    pub fn spawn(self, stop: StopSignal) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::media::{EncodedResult, Frame};
    use crate::shutdown::Shutdown;

    fn broadcaster(fps: u32) -> Broadcaster {
        Broadcaster::new(
            Arc::new(LatestResultSlot::new()),
            Arc::new(SubscriberRegistry::new()),
            Arc::new(PipelineStats::new()),
            fps,
        )
    }

    fn publish(slot: &LatestResultSlot, data: &'static [u8]) {
        let frame = Frame::new(Bytes::new(), 0, 0);
        slot.publish(EncodedResult::for_frame(&frame, Bytes::from_static(data)));
    }

    #[tokio::test]
    async fn test_empty_slot_is_noop() {
        let b = broadcaster(25);
        let mut sub = b.registry.register(None).await;

        let report = b.cycle().await;
        assert!(report.is_idle());
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_subscribers_is_noop() {
        let b = broadcaster(25);
        publish(&b.slot, b"frame");

        let report = b.cycle().await;
        assert_eq!(report, CycleReport::default());
        assert_eq!(b.stats.snapshot().deliveries, 0);
    }

    #[tokio::test]
    async fn test_delivers_same_payload_to_all() {
        let b = broadcaster(25);
        let mut s1 = b.registry.register(None).await;
        let mut s2 = b.registry.register(None).await;
        publish(&b.slot, b"jpeg");

        let report = b.cycle().await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(s1.rx.recv().await.unwrap(), Bytes::from_static(b"jpeg"));
        assert_eq!(s2.rx.recv().await.unwrap(), Bytes::from_static(b"jpeg"));
    }

    #[tokio::test]
    async fn test_failed_subscriber_pruned_others_served() {
        let b = broadcaster(25);
        let mut alive = b.registry.register(None).await;
        let dead = b.registry.register(None).await;
        let dead_id = dead.id;
        drop(dead);
        publish(&b.slot, b"jpeg");

        let report = b.cycle().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, 1);
        assert!(!b.registry.contains(dead_id).await);
        assert_eq!(alive.rx.recv().await.unwrap(), Bytes::from_static(b"jpeg"));

        // Subsequent cycles only target the survivor
        for _ in 0..3 {
            let report = b.cycle().await;
            assert_eq!(report.attempted, 1);
            assert_eq!(report.delivered, 1);
            assert!(alive.rx.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn test_full_subscriber_skipped_not_pruned() {
        let b = broadcaster(25);
        // Never drained after the first payload
        let mut stuck = b.registry.register(None).await;
        let mut fast = b.registry.register(None).await;
        publish(&b.slot, b"one");

        b.cycle().await;
        fast.rx.recv().await.unwrap();
        publish(&b.slot, b"two");

        let report = b.cycle().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.pruned, 0);
        assert!(b.registry.contains(stuck.id).await);
        assert_eq!(fast.rx.recv().await.unwrap(), Bytes::from_static(b"two"));

        // Once drained, the stuck subscriber gets the newest payload
        assert_eq!(stuck.rx.recv().await.unwrap(), Bytes::from_static(b"one"));
        b.cycle().await;
        assert_eq!(stuck.rx.recv().await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(b.stats.snapshot().deliveries_skipped, 1);
    }

    #[tokio::test]
    async fn test_slow_reader_does_not_slow_others() {
        let b = broadcaster(25);
        let registry = Arc::clone(&b.registry);
        publish(&b.slot, b"jpeg");

        let mut slow = registry.register(None).await;
        let mut fast = registry.register(None).await;
        let slow_id = slow.id;

        let slow_count = Arc::new(AtomicUsize::new(0));
        let fast_count = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&slow_count);
        let slow_reader = tokio::spawn(async move {
            while slow.rx.recv().await.is_some() {
                counted.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
        });
        let counted = Arc::clone(&fast_count);
        let fast_reader = tokio::spawn(async move {
            while fast.rx.recv().await.is_some() {
                counted.fetch_add(1, Ordering::Relaxed);
            }
        });

        let shutdown = Shutdown::new();
        let handle = b.spawn(shutdown.signal());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        shutdown.trigger();
        handle.await.unwrap();

        // 1s at 40ms per cycle is ~25 payloads for a reader that keeps up
        let fast_received = fast_count.load(Ordering::Relaxed);
        let slow_received = slow_count.load(Ordering::Relaxed);
        assert!(fast_received >= 18, "fast subscriber got {}", fast_received);
        assert!(slow_received <= 6, "slow subscriber got {}", slow_received);
        assert!(registry.contains(slow_id).await);

        slow_reader.abort();
        fast_reader.abort();
    }

    #[tokio::test]
    async fn test_run_idle_keeps_period() {
        let b = broadcaster(50);
        let stats = Arc::clone(&b.stats);
        let shutdown = Shutdown::new();

        let handle = b.spawn(shutdown.signal());
        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.trigger();
        handle.await.unwrap();

        // 300ms at 20ms per cycle is ~15 cycles; allow scheduling slack but
        // catch both a busy loop and a stalled loop
        let snapshot = stats.snapshot();
        assert!(snapshot.broadcast_cycles >= 5, "{:?}", snapshot);
        assert!(snapshot.broadcast_cycles <= 30, "{:?}", snapshot);
        assert_eq!(snapshot.deliveries, 0);
    }
}
