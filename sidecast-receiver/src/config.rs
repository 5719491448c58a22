//! Configuration for the receiver.

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sidecast_core::{DisplayMode, PipelineConfig, RepairSizing};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Socket settings.
    pub network: NetworkConfig,
    /// Where assembled frames go.
    pub output: OutputConfig,
    /// Display mode assumed until the host announces one.
    pub display: DisplayConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind (all interfaces by default).
    pub bind_address: String,
    /// UDP port the host streams to.
    pub listen_port: u16,
    /// Receive wait before the reader re-checks for shutdown, in milliseconds.
    pub recv_timeout_ms: u64,
    /// Requested kernel receive buffer, in bytes.
    pub recv_buffer_bytes: usize,
    /// Largest datagram accepted, header included.
    pub max_datagram_size: usize,
    pub reuse_address: bool,
    /// Length given to chunks rebuilt from parity:
    /// "parity_length" or "longest_present".
    pub repair_sizing: RepairSizing,
}

/// Frame output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File that receives every assembled frame back to back (an Annex-B
    /// stream for H.264 hosts). If empty, frames are only counted.
    pub file: String,
    /// Discard frames until the first keyframe.
    pub wait_for_keyframe: bool,
}

/// Initial display mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Seconds between statistics lines; 0 disables them.
    pub stats_interval_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        let core = PipelineConfig::default();
        Self {
            bind_address: core.bind_addr.ip().to_string(),
            listen_port: core.bind_addr.port(),
            recv_timeout_ms: core.recv_timeout.as_millis() as u64,
            recv_buffer_bytes: core.recv_buffer_size,
            max_datagram_size: core.max_datagram_size,
            reuse_address: core.reuse_address,
            repair_sizing: core.repair_sizing,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: String::new(),
            wait_for_keyframe: true,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let mode = DisplayMode::default();
        Self {
            width: mode.width,
            height: mode.height,
            fps: mode.fps,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            stats_interval_secs: 5,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ReceiverConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Socket and reassembly settings for the core pipeline.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, AddrParseError> {
        let ip: IpAddr = self.network.bind_address.parse()?;
        Ok(PipelineConfig {
            bind_addr: SocketAddr::new(ip, self.network.listen_port),
            max_datagram_size: self.network.max_datagram_size.max(sidecast_core::HEADER_SIZE),
            recv_timeout: Duration::from_millis(self.network.recv_timeout_ms.max(1)),
            recv_buffer_size: self.network.recv_buffer_bytes,
            reuse_address: self.network.reuse_address,
            repair_sizing: self.network.repair_sizing,
        })
    }

    pub fn initial_display_mode(&self) -> DisplayMode {
        DisplayMode {
            width: self.display.width,
            height: self.display.height,
            fps: self.display.fps,
        }
    }

    /// Stats logging period, if enabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.logging.stats_interval_secs > 0)
            .then(|| Duration::from_secs(self.logging.stats_interval_secs))
    }
}

// ── Tests ────────────────────────────────────────────────────────
