//! Host-side framing: the inverse of the receive path.
//!
//! A [`Packetizer`] turns an encoded frame into the datagrams a host
//! puts on the wire:
//!
//! ```text
//! data 0 .. data N-1   (chunk_index = 0..N, at most max_payload bytes each)
//! even parity          (chunk_index = 0xF000)
//! odd parity           (chunk_index = 0xF001)
//! ```
//!
//! Every datagram gets the next sequence id; all datagrams of one frame
//! share a frame id. Both counters wrap at 16 bits. Keyframes set the
//! keyframe flag on every datagram of the frame, parity included.

use std::net::SocketAddr;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::UdpSocket;

use crate::control::ControlMessage;
use crate::error::CastError;
use crate::fec::parity_of;
use crate::flags::PacketFlags;
use crate::header::{HEADER_SIZE, PARITY_INDEX_BASE, PacketHeader, Partition};
use crate::pipeline::MAX_DATAGRAM_SIZE;

/// Largest chunk payload that keeps a datagram within [`MAX_DATAGRAM_SIZE`].
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;

// ── Packetizer ───────────────────────────────────────────────────

/// Splits frames into sequenced, parity-protected datagrams.
#[derive(Debug, Clone)]
pub struct Packetizer {
    next_sequence: u16,
    next_frame: u16,
    max_payload: usize,
}

impl Packetizer {
    pub fn new() -> Self {
        Self {
            next_sequence: 0,
            next_frame: 0,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Override the chunk payload size. Zero is raised to one byte.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload.max(1);
        self
    }

    /// Start numbering from the given ids.
    pub fn starting_at(mut self, sequence_id: u16, frame_id: u16) -> Self {
        self.next_sequence = sequence_id;
        self.next_frame = frame_id;
        self
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Sequence id the next datagram will carry.
    pub fn next_sequence_id(&self) -> u16 {
        self.next_sequence
    }

    /// Frame id the next frame will carry.
    pub fn next_frame_id(&self) -> u16 {
        self.next_frame
    }

    /// Split `frame` into data datagrams followed by the two parity datagrams.
    ///
    /// Fails if the frame needs more chunks than the index space below
    /// the parity sentinels allows.
    pub fn packetize(&mut self, frame: &[u8], is_keyframe: bool) -> Result<Vec<Bytes>, CastError> {
        let chunks: Vec<&[u8]> = frame.chunks(self.max_payload).collect();
        let total_chunks = u16::try_from(chunks.len())
            .ok()
            .filter(|&n| n <= PARITY_INDEX_BASE)
            .ok_or_else(|| {
                CastError::Other(format!(
                    "frame of {} bytes needs {} chunks, limit is {PARITY_INDEX_BASE}",
                    frame.len(),
                    chunks.len(),
                ))
            })?;

        let frame_id = self.next_frame;
        self.next_frame = self.next_frame.wrapping_add(1);

        let flags = if is_keyframe {
            PacketFlags::KEYFRAME
        } else {
            PacketFlags::empty()
        };

        let mut out = Vec::with_capacity(chunks.len() + 2);
        for (index, chunk) in chunks.iter().enumerate() {
            out.push(self.datagram(frame_id, total_chunks, index as u16, flags, chunk));
        }
        for partition in Partition::ALL {
            let parity = parity_of(
                chunks
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| partition.contains(*i))
                    .map(|(_, c)| *c),
            );
            out.push(self.datagram(frame_id, total_chunks, partition.sentinel(), flags, &parity));
        }
        Ok(out)
    }

    /// Wrap a control message in a datagram with the control flag set.
    pub fn control(&mut self, message: &ControlMessage) -> Result<Bytes, CastError> {
        let body = message.to_bytes()?;
        Ok(self.datagram(0, 0, 0, PacketFlags::CONTROL, &body))
    }

    fn datagram(
        &mut self,
        frame_id: u16,
        total_chunks: u16,
        chunk_index: u16,
        flags: PacketFlags,
        body: &[u8],
    ) -> Bytes {
        let header = PacketHeader {
            sequence_id: self.next_sequence,
            frame_id,
            total_chunks,
            chunk_index,
            flags,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
        buf.put_slice(&header.encode());
        buf.put_slice(body);
        buf.freeze()
    }
}

impl Default for Packetizer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Sending ──────────────────────────────────────────────────────

/// Send `datagrams` to `target` in order, returning the bytes sent.
pub async fn send_datagrams(
    socket: &UdpSocket,
    target: SocketAddr,
    datagrams: &[Bytes],
) -> Result<usize, CastError> {
    let mut sent = 0;
    for datagram in datagrams {
        sent += socket.send_to(datagram, target).await?;
    }
    Ok(sent)
}

// ── Tests ────────────────────────────────────────────────────────
