//! # sidecast-receiver
//!
//! Receiving end of the sidecast screen-mirroring link. Binds the UDP
//! port the host streams to, reassembles and repairs frames with
//! `sidecast-core`, and hands them to a frame sink that dumps them to a
//! file or simply counts them. Host keepalives drive a display-mode
//! tracker.

pub mod config;
pub mod service;
pub mod sinks;
