//! Frame and control sinks used by the receiver binary.
//!
//! [`FrameDumpSink`] stands in for a hardware decoder: it appends every
//! assembled frame to a file (or just counts them). [`DisplayModeTracker`]
//! plays the configuration role, following the mode the host announces
//! in its keepalives and remembering where touch input should go.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::Path;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use sidecast_core::{CastError, ControlMessage, ControlSink, DisplayMode, FrameSink};

// ── FrameDumpSink ────────────────────────────────────────────────

/// Writes assembled frames back to back, optionally skipping everything
/// before the first keyframe.
pub struct FrameDumpSink {
    out: Option<BufWriter<File>>,
    wait_for_keyframe: bool,
    frames_written: u64,
    bytes_written: u64,
    frames_skipped: u64,
}

impl FrameDumpSink {
    /// Count frames without writing them anywhere.
    pub fn counting(wait_for_keyframe: bool) -> Self {
        Self {
            out: None,
            wait_for_keyframe,
            frames_written: 0,
            bytes_written: 0,
            frames_skipped: 0,
        }
    }

    /// Create (or truncate) `path` and write frames to it.
    pub fn create(path: &Path, wait_for_keyframe: bool) -> std::io::Result<Self> {
        let file = File::create(path)?;
        info!("writing frames to {}", path.display());
        let mut sink = Self::counting(wait_for_keyframe);
        sink.out = Some(BufWriter::new(file));
        Ok(sink)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Frames dropped while waiting for the first keyframe.
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }
}

impl FrameSink for FrameDumpSink {
    fn decode(&mut self, frame: Bytes, is_keyframe: bool) -> Result<(), CastError> {
        if self.wait_for_keyframe {
            if !is_keyframe {
                self.frames_skipped += 1;
                return Ok(());
            }
            debug!(skipped = self.frames_skipped, "first keyframe received");
            self.wait_for_keyframe = false;
        }

        if let Some(out) = &mut self.out {
            out.write_all(&frame)
                .map_err(|e| CastError::Decoder(format!("frame dump write failed: {e}")))?;
            if is_keyframe {
                out.flush()
                    .map_err(|e| CastError::Decoder(format!("frame dump flush failed: {e}")))?;
            }
        }
        self.frames_written += 1;
        self.bytes_written += frame.len() as u64;
        Ok(())
    }
}

impl Drop for FrameDumpSink {
    fn drop(&mut self) {
        if let Some(out) = &mut self.out {
            if let Err(e) = out.flush() {
                warn!("frame dump flush failed: {e}");
            }
        }
    }
}

// ── DisplayModeTracker ───────────────────────────────────────────

/// What the receiver currently knows about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub mode: DisplayMode,
    /// Bitrate from the latest keepalive, in Mbit/s.
    pub bitrate: Option<u32>,
    /// Address the latest control packet came from.
    pub host: Option<SocketAddr>,
    /// Where touch events would be sent: host address plus `touchPort`.
    pub touch_endpoint: Option<SocketAddr>,
    /// Mode changes seen since start.
    pub mode_changes: u64,
}

/// Follows host keepalives and publishes the resulting [`DisplayState`].
pub struct DisplayModeTracker {
    state: DisplayState,
    state_tx: watch::Sender<DisplayState>,
}

impl DisplayModeTracker {
    pub fn new(initial: DisplayMode) -> Self {
        let state = DisplayState {
            mode: initial,
            bitrate: None,
            host: None,
            touch_endpoint: None,
            mode_changes: 0,
        };
        let (state_tx, _) = watch::channel(state.clone());
        Self { state, state_tx }
    }

    /// Obtain a `watch::Receiver` for the latest display state.
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }
}

impl ControlSink for DisplayModeTracker {
    fn apply(&mut self, message: ControlMessage, source: SocketAddr) {
        if self.state.host != Some(source) {
            info!("host at {source}");
        }
        self.state.host = Some(source);

        let Some(mode) = message.display_mode() else {
            warn!(kind = ?message.kind, "control packet without a complete display mode");
            self.state_tx.send_replace(self.state.clone());
            return;
        };

        if mode != self.state.mode {
            info!("display mode {} -> {mode}", self.state.mode);
            self.state.mode = mode;
            self.state.mode_changes += 1;
        }
        if let Some(bitrate) = message.bitrate {
            self.state.bitrate = Some(bitrate);
        }
        if let Some(port) = message.touch_port {
            let endpoint = SocketAddr::new(source.ip(), port);
            if self.state.touch_endpoint != Some(endpoint) {
                debug!("touch endpoint {endpoint}");
            }
            self.state.touch_endpoint = Some(endpoint);
        }

        self.state_tx.send_replace(self.state.clone());
    }
}

// ── Tests ────────────────────────────────────────────────────────
