//! Collaborators the pipeline hands its output to.
//!
//! The pipeline does not decode video or reconfigure displays itself.
//! Assembled frames go to a [`FrameSink`]; parsed control messages go to
//! a [`ControlSink`]. Both run on the consumer task, so implementations
//! must return quickly: a slow sink delays every datagram behind it.
//!
//! Closures implement both traits, which keeps tests and small
//! embeddings short:
//!
//! ```
//! use sidecast_core::{CastError, FrameSink};
//!
//! let mut delivered = 0usize;
//! let mut sink = move |frame: bytes::Bytes, _key: bool| -> Result<(), CastError> {
//!     delivered += frame.len();
//!     Ok(())
//! };
//! sink.decode(bytes::Bytes::from_static(b"abc"), true).unwrap();
//! ```

use std::net::SocketAddr;

use bytes::Bytes;

use crate::control::ControlMessage;
use crate::error::CastError;

/// Consumer of assembled frames (typically a hardware decoder).
pub trait FrameSink: Send + 'static {
    /// Accept one assembled frame. `is_keyframe` is the flag of the
    /// datagram that completed the frame. Errors are logged by the
    /// pipeline and never stop it.
    fn decode(&mut self, frame: Bytes, is_keyframe: bool) -> Result<(), CastError>;
}

/// Consumer of host control messages.
pub trait ControlSink: Send + 'static {
    /// Apply a control message received from `source`.
    fn apply(&mut self, message: ControlMessage, source: SocketAddr);
}

impl<F> FrameSink for F
where
    F: FnMut(Bytes, bool) -> Result<(), CastError> + Send + 'static,
{
    fn decode(&mut self, frame: Bytes, is_keyframe: bool) -> Result<(), CastError> {
        self(frame, is_keyframe)
    }
}

impl<F> ControlSink for F
where
    F: FnMut(ControlMessage, SocketAddr) + Send + 'static,
{
    fn apply(&mut self, message: ControlMessage, source: SocketAddr) {
        self(message, source)
    }
}
