//! Per-frame chunk store.
//!
//! A [`FrameEntry`] holds the data chunks and the two parity chunks
//! received so far for one frame id. Its slot count is fixed by the
//! first datagram seen for the frame; later datagrams that declare a
//! different total are classified against the first size seen.

use bytes::{Bytes, BytesMut};

use crate::header::{ChunkKind, PacketHeader, Partition};

// ── ChunkOutcome ─────────────────────────────────────────────────

/// What happened to a datagram offered to a [`FrameEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// A previously empty data slot was filled.
    Stored(usize),
    /// The data slot was already filled; the payload was discarded.
    AlreadyFilled(usize),
    /// A parity slot was written (last write wins).
    Parity(Partition),
    /// The chunk index was out of range; nothing changed.
    Unknown(u16),
    /// The frame was already delivered; the datagram was discarded.
    Late,
}

// ── FrameEntry ───────────────────────────────────────────────────

/// Chunks and parity collected for a single frame id.
#[derive(Debug, Clone)]
pub struct FrameEntry {
    chunks: Vec<Option<Bytes>>,
    parity: [Option<Bytes>; 2],
    received: usize,
    is_keyframe: bool,
}

impl FrameEntry {
    /// Create an empty entry with `total_chunks` data slots.
    pub fn new(total_chunks: u16) -> Self {
        Self {
            chunks: vec![None; total_chunks as usize],
            parity: [None, None],
            received: 0,
            is_keyframe: false,
        }
    }

    /// Store one chunk according to the header's chunk index.
    pub fn insert(&mut self, header: &PacketHeader, payload: Bytes) -> ChunkOutcome {
        if header.is_keyframe() {
            self.is_keyframe = true;
        }

        match ChunkKind::classify(header.chunk_index, self.chunks.len()) {
            ChunkKind::Data(idx) => {
                let slot = &mut self.chunks[idx];
                if slot.is_some() {
                    return ChunkOutcome::AlreadyFilled(idx);
                }
                *slot = Some(payload);
                self.received += 1;
                ChunkOutcome::Stored(idx)
            }
            ChunkKind::Parity(partition) => {
                self.parity[partition.slot()] = Some(payload);
                ChunkOutcome::Parity(partition)
            }
            ChunkKind::Unknown(idx) => ChunkOutcome::Unknown(idx),
        }
    }

    /// Number of data slots, fixed at creation.
    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Number of filled data slots.
    pub fn received_count(&self) -> usize {
        self.received
    }

    /// Whether any datagram of this frame carried the keyframe flag.
    pub fn is_keyframe(&self) -> bool {
        self.is_keyframe
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.chunks.len()
    }

    /// Data chunk at `index`, if received (or repaired).
    pub fn chunk(&self, index: usize) -> Option<&Bytes> {
        self.chunks.get(index).and_then(Option::as_ref)
    }

    /// Parity chunk for `partition`, if received.
    pub fn parity(&self, partition: Partition) -> Option<&Bytes> {
        self.parity[partition.slot()].as_ref()
    }

    /// Indices of the empty data slots belonging to `partition`.
    pub fn missing_in(&self, partition: Partition) -> impl Iterator<Item = usize> + '_ {
        self.chunks
            .iter()
            .enumerate()
            .filter(move |(i, c)| partition.contains(*i) && c.is_none())
            .map(|(i, _)| i)
    }

    /// Present data chunks of `partition` as `(index, bytes)` pairs.
    pub fn present_in(&self, partition: Partition) -> impl Iterator<Item = (usize, &Bytes)> + '_ {
        self.chunks
            .iter()
            .enumerate()
            .filter(move |(i, _)| partition.contains(*i))
            .filter_map(|(i, c)| c.as_ref().map(|b| (i, b)))
    }

    /// Longest data chunk currently present, in bytes.
    pub fn longest_present(&self) -> Option<usize> {
        self.chunks.iter().flatten().map(Bytes::len).max()
    }

    /// Whether XOR parity can fill every gap: both parity chunks are
    /// present and each partition is missing at most one chunk.
    pub fn can_be_repaired(&self) -> bool {
        self.parity.iter().all(Option::is_some)
            && Partition::ALL
                .iter()
                .all(|p| self.missing_in(*p).take(2).count() <= 1)
    }

    /// Fill an empty slot with a reconstructed chunk.
    ///
    /// Returns `false` (and changes nothing) if the slot is out of range
    /// or already filled.
    pub(crate) fn fill(&mut self, index: usize, data: Bytes) -> bool {
        let Some(slot) = self.chunks.get_mut(index) else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(data);
        self.received += 1;
        true
    }

    /// Concatenate the data chunks in index order.
    ///
    /// Empty slots contribute nothing, so callers should only assemble
    /// complete (or repaired) entries.
    pub fn assemble(&self) -> Bytes {
        let total: usize = self.chunks.iter().flatten().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(total);
        for chunk in self.chunks.iter().flatten() {
            out.extend_from_slice(chunk);
        }
        out.freeze()
    }
}

// ── Tests ────────────────────────────────────────────────────────
