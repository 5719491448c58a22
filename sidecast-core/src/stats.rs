//! Receive-side counters.
//!
//! The consumer owns a [`ReceiverStats`] and publishes a copy over a
//! `tokio::sync::watch` channel after each datagram, so a UI or a log
//! ticker can read the latest numbers without touching the pipeline.

use std::fmt;

/// Running totals for one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Datagrams taken off the queue.
    pub datagrams: u64,
    /// Bytes taken off the queue, headers included.
    pub bytes: u64,
    /// Datagrams shorter than the header.
    pub too_short: u64,
    /// Datagrams whose sequence id was already seen.
    pub duplicates: u64,
    /// Times the dedup cache overflowed and was cleared.
    pub dedup_resets: u64,
    /// Control packets parsed and dispatched.
    pub control_packets: u64,
    /// Control packets whose body did not parse.
    pub malformed_control: u64,
    /// Chunks whose index was neither data nor parity.
    pub unknown_chunks: u64,
    /// Chunks that arrived after their frame was delivered.
    pub late_chunks: u64,
    /// Frames handed to the decoder.
    pub frames_delivered: u64,
    /// Delivered frames flagged as keyframes.
    pub keyframes_delivered: u64,
    /// Delivered frames that needed parity repair.
    pub frames_repaired: u64,
    /// Chunks rebuilt from parity.
    pub chunks_repaired: u64,
    /// Incomplete frames dropped to stay within capacity.
    pub frames_evicted: u64,
    /// Frames the decoder rejected.
    pub decoder_errors: u64,
}

impl ReceiverStats {
    /// Datagrams dropped before reaching the frame buffer for any reason.
    pub fn dropped(&self) -> u64 {
        self.too_short + self.duplicates + self.malformed_control
    }
}

impl fmt::Display for ReceiverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "datagrams={} bytes={} delivered={} keyframes={} repaired={} evicted={} dropped={} control={}",
            self.datagrams,
            self.bytes,
            self.frames_delivered,
            self.keyframes_delivered,
            self.frames_repaired,
            self.frames_evicted,
            self.dropped(),
            self.control_packets,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_sums_drop_reasons() {
        let stats = ReceiverStats {
            too_short: 1,
            duplicates: 2,
            malformed_control: 3,
            unknown_chunks: 100,
            ..Default::default()
        };
        assert_eq!(stats.dropped(), 6);
        assert!(stats.to_string().contains("dropped=6"));
    }
}
