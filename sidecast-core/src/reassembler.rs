//! Per-datagram processing owned by the consumer task.
//!
//! [`Reassembler::process`] runs the full receive path for one datagram:
//!
//! 1. reject anything shorter than the header
//! 2. decode the header
//! 3. drop repeated sequence ids
//! 4. divert control packets before they reach the frame buffer
//! 5. store the chunk in the jitter buffer (evicting as needed)
//! 6. ask the buffer for the next deliverable frame
//!
//! Nothing here is async or shared, so the whole path is unit-testable
//! without a socket.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::control::ControlMessage;
use crate::dedup::{SeqVerdict, SequenceDeduplicator};
use crate::fec::RepairSizing;
use crate::frame::ChunkOutcome;
use crate::header::PacketHeader;
use crate::jitter::{InsertReport, JitterBuffer, ReadyFrame};
use crate::stats::ReceiverStats;

// ── Event ────────────────────────────────────────────────────────

/// Why a datagram never reached the frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TooShort,
    Duplicate,
    MalformedControl,
}

/// What one datagram produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Dropped(DropReason),
    /// A control packet for the control sink.
    Control(ControlMessage),
    /// A chunk was stored; `ready` holds the frame it made deliverable, if any.
    Buffered {
        report: InsertReport,
        /// Keyframe flag of this datagram's header, handed to the decoder
        /// along with `ready`.
        keyframe: bool,
        ready: Option<ReadyFrame>,
    },
}

impl Event {
    /// The frame this datagram made deliverable.
    pub fn ready_frame(&self) -> Option<&ReadyFrame> {
        match self {
            Event::Buffered { ready, .. } => ready.as_ref(),
            _ => None,
        }
    }
}

// ── Reassembler ──────────────────────────────────────────────────

/// Dedup cache, jitter buffer and counters for one stream.
#[derive(Debug, Default)]
pub struct Reassembler {
    dedup: SequenceDeduplicator,
    buffer: JitterBuffer,
    stats: ReceiverStats,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build around a custom dedup cache and buffer.
    pub fn with_parts(dedup: SequenceDeduplicator, buffer: JitterBuffer) -> Self {
        Self {
            dedup,
            buffer,
            stats: ReceiverStats::default(),
        }
    }

    /// Default components with the given repair sizing.
    pub fn with_repair_sizing(sizing: RepairSizing) -> Self {
        Self::with_parts(
            SequenceDeduplicator::new(),
            JitterBuffer::new().with_repair_sizing(sizing),
        )
    }

    /// Run one datagram through the receive path.
    pub fn process(&mut self, datagram: &Bytes) -> Event {
        self.stats.datagrams += 1;
        self.stats.bytes += datagram.len() as u64;

        let header = match PacketHeader::decode(datagram) {
            Ok(header) => header,
            Err(e) => {
                // Decoding only fails on length.
                trace!(error = %e, "dropping runt datagram");
                self.stats.too_short += 1;
                return Event::Dropped(DropReason::TooShort);
            }
        };

        match self.dedup.observe(header.sequence_id) {
            SeqVerdict::Duplicate => {
                trace!(seq = header.sequence_id, "duplicate sequence id");
                self.stats.duplicates += 1;
                return Event::Dropped(DropReason::Duplicate);
            }
            SeqVerdict::FreshAfterReset => {
                debug!(seq = header.sequence_id, "dedup cache cleared");
                self.stats.dedup_resets += 1;
            }
            SeqVerdict::Fresh => {}
        }

        let payload = datagram.slice(PacketHeader::SIZE..);

        if header.is_control() {
            return match ControlMessage::parse(&payload) {
                Ok(message) => {
                    self.stats.control_packets += 1;
                    Event::Control(message)
                }
                Err(e) => {
                    warn!(seq = header.sequence_id, error = %e, "malformed control packet");
                    self.stats.malformed_control += 1;
                    Event::Dropped(DropReason::MalformedControl)
                }
            };
        }

        let report = self.buffer.insert(&header, payload);
        self.stats.frames_evicted += report.evicted as u64;
        match report.outcome {
            ChunkOutcome::Unknown(index) => {
                trace!(frame = header.frame_id, index, "ignoring unknown chunk index");
                self.stats.unknown_chunks += 1;
            }
            ChunkOutcome::Late => self.stats.late_chunks += 1,
            _ => {}
        }

        let ready = self.buffer.next_ready_frame();
        if let Some(frame) = &ready {
            self.stats.frames_delivered += 1;
            if frame.is_keyframe {
                self.stats.keyframes_delivered += 1;
            }
            if frame.repaired_chunks > 0 {
                self.stats.frames_repaired += 1;
                self.stats.chunks_repaired += frame.repaired_chunks as u64;
                debug!(
                    frame = frame.frame_id,
                    chunks = frame.repaired_chunks,
                    "repaired frame from parity"
                );
            }
        }

        Event::Buffered {
            report,
            keyframe: header.is_keyframe(),
            ready,
        }
    }

    /// Count a frame the decoder refused.
    pub fn record_decoder_error(&mut self) {
        self.stats.decoder_errors += 1;
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn buffer(&self) -> &JitterBuffer {
        &self.buffer
    }

    pub fn dedup(&self) -> &SequenceDeduplicator {
        &self.dedup
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DEDUP_CAPACITY;
    use crate::fec::parity_of;
    use crate::flags::PacketFlags;
    use crate::header::{PARITY_EVEN_INDEX, PARITY_ODD_INDEX};

    fn datagram(seq: u16, frame: u16, total: u16, index: u16, flags: PacketFlags, body: &[u8]) -> Bytes {
        let header = PacketHeader {
            sequence_id: seq,
            frame_id: frame,
            total_chunks: total,
            chunk_index: index,
            flags,
        };
        let mut out = header.encode().to_vec();
        out.extend_from_slice(body);
        Bytes::from(out)
    }

    fn data(seq: u16, frame: u16, total: u16, index: u16, body: &[u8]) -> Bytes {
        datagram(seq, frame, total, index, PacketFlags::empty(), body)
    }

    #[test]
    fn runt_datagram_is_dropped() {
        let mut r = Reassembler::new();
        let event = r.process(&Bytes::from_static(&[0u8; 11]));
        assert_eq!(event, Event::Dropped(DropReason::TooShort));
        assert_eq!(r.stats().too_short, 1);
        assert!(r.buffer().is_empty());
        assert!(r.dedup().is_empty());
    }

    #[test]
    fn single_chunk_frame_is_delivered_immediately() {
        let mut r = Reassembler::new();
        let event = r.process(&data(1, 7, 1, 0, b"hello"));
        let frame = event.ready_frame().unwrap();
        assert_eq!(frame.frame_id, 7);
        assert_eq!(frame.data.as_ref(), b"hello");
        assert_eq!(r.stats().frames_delivered, 1);
    }

    #[test]
    fn duplicate_sequence_is_suppressed() {
        let mut r = Reassembler::new();
        assert!(r.process(&data(5, 1, 2, 0, b"AA")).ready_frame().is_none());
        assert_eq!(r.process(&data(5, 1, 2, 0, b"AA")), Event::Dropped(DropReason::Duplicate));
        assert_eq!(r.stats().duplicates, 1);
        assert_eq!(r.buffer().entry(1).unwrap().received_count(), 1);
    }

    #[test]
    fn duplicate_check_precedes_control_handling() {
        let mut r = Reassembler::new();
        let body = br#"{"type":"keepalive"}"#;
        assert!(matches!(
            r.process(&datagram(9, 0, 0, 0, PacketFlags::CONTROL, body)),
            Event::Control(_)
        ));
        assert_eq!(
            r.process(&datagram(9, 0, 0, 0, PacketFlags::CONTROL, body)),
            Event::Dropped(DropReason::Duplicate)
        );
    }

    #[test]
    fn control_packet_never_touches_the_buffer() {
        let mut r = Reassembler::new();
        let body = br#"{"type":"keepalive","width":1920,"height":1080,"fps":60,"touchPort":5005}"#;
        let event = r.process(&datagram(1, 3, 2, 0, PacketFlags::CONTROL, body));
        let Event::Control(message) = event else {
            panic!("expected control event, got {event:?}");
        };
        assert_eq!(message.touch_port, Some(5005));
        assert!(r.buffer().is_empty());
        assert_eq!(r.stats().control_packets, 1);
    }

    #[test]
    fn malformed_control_is_dropped() {
        let mut r = Reassembler::new();
        let event = r.process(&datagram(1, 0, 0, 0, PacketFlags::CONTROL, b"not json"));
        assert_eq!(event, Event::Dropped(DropReason::MalformedControl));
        assert_eq!(r.stats().malformed_control, 1);
        assert!(r.buffer().is_empty());
    }

    #[test]
    fn two_chunk_frame_seven() {
        let mut r = Reassembler::new();
        assert!(r.process(&data(1, 7, 2, 0, b"AA")).ready_frame().is_none());
        let event = r.process(&data(2, 7, 2, 1, b"BB"));
        let frame = event.ready_frame().unwrap();
        assert_eq!(frame.frame_id, 7);
        assert_eq!(frame.data.as_ref(), b"AABB");
        assert!(r.buffer().entry(7).is_none());
    }

    #[test]
    fn out_of_order_chunks_assemble_in_index_order() {
        let mut r = Reassembler::new();
        assert!(r.process(&data(2, 4, 2, 1, b"BB")).ready_frame().is_none());
        let event = r.process(&data(1, 4, 2, 0, b"AA"));
        assert_eq!(event.ready_frame().unwrap().data.as_ref(), b"AABB");
    }

    #[test]
    fn parity_after_delivery_is_late() {
        let mut r = Reassembler::new();
        r.process(&data(1, 7, 2, 0, b"AA"));
        r.process(&data(2, 7, 2, 1, b"BB"));
        let event = r.process(&datagram(
            3,
            7,
            2,
            PARITY_EVEN_INDEX,
            PacketFlags::empty(),
            b"AA",
        ));
        assert!(event.ready_frame().is_none());
        assert_eq!(r.stats().late_chunks, 1);
        assert_eq!(r.stats().frames_delivered, 1);
        assert!(r.buffer().is_empty());
    }

    #[test]
    fn lost_chunk_is_repaired_from_parity() {
        let mut r = Reassembler::new();
        r.process(&data(1, 2, 2, 0, b"AA"));
        r.process(&datagram(
            3,
            2,
            2,
            PARITY_EVEN_INDEX,
            PacketFlags::empty(),
            &parity_of([&b"AA"[..]]),
        ));
        let event = r.process(&datagram(
            4,
            2,
            2,
            PARITY_ODD_INDEX,
            PacketFlags::empty(),
            &parity_of([&b"BB"[..]]),
        ));

        let frame = event.ready_frame().unwrap();
        assert_eq!(frame.data.as_ref(), b"AABB");
        assert_eq!(frame.repaired_chunks, 1);
        assert_eq!(r.stats().frames_repaired, 1);
        assert_eq!(r.stats().chunks_repaired, 1);
    }

    #[test]
    fn unknown_chunk_index_is_counted() {
        let mut r = Reassembler::new();
        r.process(&data(1, 1, 2, 0xF005, b"??"));
        assert_eq!(r.stats().unknown_chunks, 1);
        assert_eq!(r.buffer().entry(1).unwrap().received_count(), 0);
    }

    #[test]
    fn keyframe_stats_follow_delivery() {
        let mut r = Reassembler::new();
        r.process(&datagram(1, 1, 1, 0, PacketFlags::KEYFRAME, b"I"));
        r.process(&data(2, 2, 1, 0, b"P"));
        assert_eq!(r.stats().frames_delivered, 2);
        assert_eq!(r.stats().keyframes_delivered, 1);
    }

    #[test]
    fn decoder_flag_comes_from_completing_header() {
        let mut r = Reassembler::new();
        r.process(&datagram(1, 7, 2, 0, PacketFlags::KEYFRAME, b"AA"));
        let event = r.process(&data(2, 7, 2, 1, b"BB"));
        let Event::Buffered {
            keyframe,
            ready: Some(frame),
            ..
        } = event
        else {
            panic!("expected frame 7, got {event:?}");
        };
        assert!(!keyframe);
        assert_eq!(frame.data.as_ref(), b"AABB");
        // The stats still count the frame as carrying keyframe data.
        assert!(frame.is_keyframe);
        assert_eq!(r.stats().keyframes_delivered, 1);
    }

    #[test]
    fn keyframe_completing_chunk_sets_decoder_flag() {
        let mut r = Reassembler::new();
        r.process(&data(1, 3, 2, 1, b"BB"));
        let event = r.process(&datagram(2, 3, 2, 0, PacketFlags::KEYFRAME, b"AA"));
        assert!(matches!(
            event,
            Event::Buffered {
                keyframe: true,
                ready: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn evictions_are_counted() {
        let mut r = Reassembler::new();
        for frame in 0..8u16 {
            r.process(&data(frame, frame, 2, 0, b"x"));
        }
        assert_eq!(r.buffer().len(), 5);
        assert_eq!(r.stats().frames_evicted, 3);
    }

    #[test]
    fn dedup_overflow_forgets_old_ids() {
        let mut r = Reassembler::new();
        for seq in 0..=DEDUP_CAPACITY as u16 {
            r.process(&data(seq, 0, 0xFFF, 0, b"x"));
        }
        assert_eq!(r.stats().dedup_resets, 1);
        // Sequence 0 was seen before the reset and is accepted again.
        assert!(matches!(r.process(&data(0, 0, 0xFFF, 0, b"x")), Event::Buffered { .. }));
    }
}
