//! # sidecast-core
//!
//! Receive-side transport for the sidecast screen-mirroring link.
//!
//! A host splits each encoded video frame into UDP datagrams, appends two
//! XOR parity chunks, and streams them to the receiver. This crate turns
//! that lossy, reordered, duplicate-prone stream back into whole frames.
//!
//! This crate contains:
//! - **Wire format**: `PacketHeader`, `PacketFlags`, chunk classification
//! - **Reassembly**: `SequenceDeduplicator`, `FrameEntry`, `JitterBuffer`
//! - **FEC**: single-erasure XOR repair per even/odd partition
//! - **Pipeline**: `IngressPipeline`, a socket reader feeding one consumer
//! - **Control**: `ControlMessage` keepalives carrying the display mode
//! - **Host side**: `Packetizer`, the matching sender framing
//! - **Error**: `CastError`, a `thiserror`-based error type

pub mod control;
pub mod dedup;
pub mod error;
pub mod fec;
pub mod flags;
pub mod frame;
pub mod header;
pub mod jitter;
pub mod packetizer;
pub mod pipeline;
pub mod reassembler;
pub mod sink;
pub mod stats;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use control::{ControlMessage, DisplayMode};
pub use dedup::{DEDUP_CAPACITY, SeqVerdict, SequenceDeduplicator};
pub use error::CastError;
pub use fec::RepairSizing;
pub use flags::PacketFlags;
pub use frame::{ChunkOutcome, FrameEntry};
pub use header::{ChunkKind, HEADER_SIZE, PacketHeader, Partition};
pub use jitter::{InsertReport, JitterBuffer, MAX_BUFFERED_FRAMES, ReadyFrame};
pub use packetizer::{Packetizer, send_datagrams};
pub use pipeline::{
    DEFAULT_PORT, Datagram, IngressPipeline, MAX_DATAGRAM_SIZE, PipelineConfig, ShutdownHandle,
};
pub use reassembler::{DropReason, Event, Reassembler};
pub use sink::{ControlSink, FrameSink};
pub use stats::ReceiverStats;
