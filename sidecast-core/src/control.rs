//! Control messages carried in datagrams with the control flag set.
//!
//! The host sends a JSON object after the 12-byte header, periodically
//! as a keepalive:
//!
//! ```text
//! {"type":"keepalive","width":1920,"height":1080,"fps":60,"bitrate":30,"touchPort":5005}
//! ```
//!
//! Every field is optional on the wire. A keepalive that names width,
//! height and fps describes the display mode the host is encoding at.

use serde::{Deserialize, Serialize};

use crate::error::CastError;

/// `type` value of periodic host keepalives.
pub const KEEPALIVE: &str = "keepalive";

// ── ControlMessage ───────────────────────────────────────────────

/// Parsed control packet body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    /// Target bitrate in Mbit/s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    /// UDP port on the host that accepts touch events.
    #[serde(
        rename = "touchPort",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub touch_port: Option<u16>,
}

impl ControlMessage {
    /// Parse a control packet body (the bytes after the header).
    pub fn parse(body: &[u8]) -> Result<Self, CastError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Serialize to the JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CastError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Build a host keepalive.
    pub fn keepalive(mode: DisplayMode, bitrate: Option<u32>, touch_port: Option<u16>) -> Self {
        Self {
            kind: Some(KEEPALIVE.to_string()),
            width: Some(mode.width),
            height: Some(mode.height),
            fps: Some(mode.fps),
            bitrate,
            touch_port,
        }
    }

    pub fn is_keepalive(&self) -> bool {
        self.kind.as_deref() == Some(KEEPALIVE)
    }

    /// Display mode announced by a complete keepalive, if any.
    pub fn display_mode(&self) -> Option<DisplayMode> {
        if !self.is_keepalive() {
            return None;
        }
        Some(DisplayMode {
            width: self.width?,
            height: self.height?,
            fps: self.fps?,
        })
    }
}

// ── DisplayMode ──────────────────────────────────────────────────

/// Resolution and refresh rate of the mirrored stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for DisplayMode {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 60,
        }
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

// ── Tests ────────────────────────────────────────────────────────
