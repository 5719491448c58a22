//! Domain-specific error types for the sidecast receive path.
//!
//! Nothing in the datagram path is fatal: every variant that can arise
//! from network input degrades into "drop this datagram or frame". The
//! only errors that stop the pipeline are socket setup failures.

use thiserror::Error;

/// The canonical error type for sidecast.
#[derive(Debug, Error)]
pub enum CastError {
    // ── Datagram Errors ──────────────────────────────────────────
    /// The datagram is shorter than the fixed packet header.
    #[error("datagram too short: {len} bytes (header is 12)")]
    TooShort { len: usize },

    /// The chunk index is neither a data index nor a parity sentinel.
    #[error("unknown chunk index: {0:#06x}")]
    UnknownChunkIndex(u16),

    /// The sequence id was already seen.
    #[error("duplicate sequence id: {0}")]
    DuplicateSequence(u16),

    /// A control packet body could not be parsed.
    #[error("malformed control packet: {0}")]
    MalformedControlPacket(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The UDP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The datagram queue was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Collaborator Errors ──────────────────────────────────────
    /// The decoder collaborator rejected a frame.
    #[error("decoder error: {0}")]
    Decoder(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for CastError {
    fn from(s: String) -> Self {
        CastError::Other(s)
    }
}

impl From<&str> for CastError {
    fn from(s: &str) -> Self {
        CastError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for CastError {
    fn from(e: serde_json::Error) -> Self {
        CastError::MalformedControlPacket(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CastError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CastError::ChannelClosed
    }
}
