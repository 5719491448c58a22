//! Receiver service: wires the configured sinks to the ingress pipeline.

use std::net::SocketAddr;
use std::path::Path;

use tokio::sync::watch;
use tracing::info;

use sidecast_core::{IngressPipeline, ReceiverStats, ShutdownHandle};

use crate::config::ReceiverConfig;
use crate::sinks::{DisplayModeTracker, DisplayState, FrameDumpSink};

/// Error type of the receiver binary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ── ReceiverService ──────────────────────────────────────────────

/// A bound receiver, ready to run.
pub struct ReceiverService {
    config: ReceiverConfig,
    pipeline: IngressPipeline,
    tracker: DisplayModeTracker,
}

impl ReceiverService {
    /// Bind the receive socket described by `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: ReceiverConfig) -> Result<Self, BoxError> {
        let pipeline = IngressPipeline::bind(config.to_pipeline_config()?)?;
        let tracker = DisplayModeTracker::new(config.initial_display_mode());
        Ok(Self {
            config,
            pipeline,
            tracker,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.pipeline.local_addr()?)
    }

    /// Obtain a handle that stops the service from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.pipeline.shutdown_handle()
    }

    pub fn stats_receiver(&self) -> watch::Receiver<ReceiverStats> {
        self.pipeline.stats_receiver()
    }

    pub fn display_receiver(&self) -> watch::Receiver<DisplayState> {
        self.tracker.subscribe()
    }

    /// Run until stopped, returning the final counters.
    pub async fn run(self) -> Result<ReceiverStats, BoxError> {
        let Self {
            config,
            pipeline,
            tracker,
        } = self;

        let frames = frame_sink(&config)?;
        let ticker = config
            .stats_interval()
            .map(|period| tokio::spawn(log_stats(pipeline.stats_receiver(), period)));

        let result = pipeline.run(frames, tracker).await;
        if let Some(ticker) = ticker {
            ticker.abort();
        }
        Ok(result?)
    }
}

fn frame_sink(config: &ReceiverConfig) -> std::io::Result<FrameDumpSink> {
    let wait = config.output.wait_for_keyframe;
    if config.output.file.is_empty() {
        Ok(FrameDumpSink::counting(wait))
    } else {
        FrameDumpSink::create(Path::new(&config.output.file), wait)
    }
}

/// Log a stats line every `period` while anything is changing.
async fn log_stats(mut stats: watch::Receiver<ReceiverStats>, period: std::time::Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    let mut last = ReceiverStats::default();
    loop {
        interval.tick().await;
        let current = stats.borrow_and_update().clone();
        if current != last {
            info!(%current, "receiver stats");
            last = current;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
