//! Relay orchestration
//!
//! Builds the shared state once, starts the three execution contexts (plus
//! the stats reporter), and tears them down in order on shutdown.

use std::sync::Arc;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::error::Result;
use crate::media::{Frame, FrameBuffer, Transform};
use crate::pipeline::{frame_period, Broadcaster, LatestResultSlot, Processor};
use crate::registry::SubscriberRegistry;
use crate::shutdown::{Shutdown, StopSignal};
use crate::source::{FrameSource, SourceConnection};
use crate::stats::{self, PipelineStats};

/// State shared between pipeline stages and the server
#[derive(Clone)]
pub struct SharedState {
    pub buffer: Arc<FrameBuffer<Frame>>,
    pub slot: Arc<LatestResultSlot>,
    pub registry: Arc<SubscriberRegistry>,
    pub stats: Arc<PipelineStats>,
}

impl SharedState {
    /// Create empty shared state sized from `config`
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            buffer: Arc::new(FrameBuffer::new(config.queue_size)),
            slot: Arc::new(LatestResultSlot::new()),
            registry: Arc::new(SubscriberRegistry::with_buffer(config.subscriber_buffer)),
            stats: Arc::new(PipelineStats::new()),
        }
    }
}

/// Entry point for starting a relay
pub struct Relay;

impl Relay {
    /// Start ingestion from `source`, processing with `transform`, and
    /// broadcasting. Must be called inside a tokio runtime.
    pub fn start<S, T>(config: &RelayConfig, source: S, transform: T) -> Result<RelayHandle>
    where
        S: FrameSource,
        T: Transform,
    {
        config.validate()?;
        let shared = SharedState::new(config);
        let shutdown = Shutdown::new();

        let connection = SourceConnection::new(
            source,
            Arc::clone(&shared.buffer),
            Arc::clone(&shared.stats),
            config.reconnect_backoff,
            frame_period(config.target_fps),
        );
        let ingest = connection.spawn(shutdown.signal())?;

        Ok(Self::launch(config, shared, shutdown, Some(ingest), transform))
    }

    /// Start processing and broadcasting with no ingestion. Subscribers can
    /// connect but receive nothing until frames are pushed into the buffer.
    pub fn start_without_source<T: Transform>(
        config: &RelayConfig,
        transform: T,
    ) -> Result<RelayHandle> {
        config.validate()?;
        let shared = SharedState::new(config);
        Ok(Self::launch(config, shared, Shutdown::new(), None, transform))
    }

    fn launch<T: Transform>(
        config: &RelayConfig,
        shared: SharedState,
        shutdown: Shutdown,
        ingest: Option<std::thread::JoinHandle<()>>,
        transform: T,
    ) -> RelayHandle {
        let processor = Processor::new(
            Arc::clone(&shared.buffer),
            Arc::clone(&shared.slot),
            transform,
            Arc::clone(&shared.stats),
        )
        .spawn(shutdown.signal());

        let broadcaster = Broadcaster::new(
            Arc::clone(&shared.slot),
            Arc::clone(&shared.registry),
            Arc::clone(&shared.stats),
            config.target_fps,
        )
        .spawn(shutdown.signal());

        let reporter =
            stats::spawn_reporter(Arc::clone(&shared.stats), config.stats_interval, shutdown.signal());

        tracing::info!(
            fps = config.target_fps,
            queue_size = config.queue_size,
            ingest = ingest.is_some(),
            "Pipeline started"
        );

        RelayHandle {
            shared,
            shutdown,
            ingest,
            processor,
            broadcaster,
            reporter,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

/// Running relay
pub struct RelayHandle {
    shared: SharedState,
    shutdown: Shutdown,
    ingest: Option<std::thread::JoinHandle<()>>,
    processor: tokio::task::JoinHandle<()>,
    broadcaster: tokio::task::JoinHandle<()>,
    reporter: tokio::task::JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl RelayHandle {
    /// Shared pipeline state
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.shared.registry
    }

    /// Pipeline counters
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.shared.stats
    }

    /// Observer for the relay's stop signal
    pub fn stop_signal(&self) -> StopSignal {
        self.shutdown.signal()
    }

    /// Stop all contexts and wait for them: ingestion, processing,
    /// broadcasting, then stats. Each wait is bounded by the shutdown
    /// timeout; a context that overruns is abandoned.
    pub async fn shutdown(self) {
        tracing::info!("Stopping pipeline");
        self.shutdown.trigger();
        let limit = self.shutdown_timeout;

        if let Some(ingest) = self.ingest {
            let join = tokio::task::spawn_blocking(move || ingest.join());
            match tokio::time::timeout(limit, join).await {
                Ok(Ok(Ok(()))) => {}
                Ok(_) => tracing::error!(stage = "ingest", "Ingestion thread panicked"),
                Err(_) => tracing::warn!(stage = "ingest", "Ingestion did not stop in time"),
            }
        }

        join_bounded("process", self.processor, limit).await;
        join_bounded("broadcast", self.broadcaster, limit).await;
        join_bounded("stats", self.reporter, limit).await;

        tracing::info!("Pipeline stopped");
    }
}

async fn join_bounded(stage: &'static str, handle: tokio::task::JoinHandle<()>, limit: Duration) {
    let abort = handle.abort_handle();
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(stage = stage, error = %e, "Task failed"),
        Err(_) => {
            tracing::warn!(stage = stage, "Task did not stop in time, aborting");
            abort.abort();
        }
    }
}
