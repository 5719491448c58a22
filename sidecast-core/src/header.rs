//! Fixed 12-byte datagram header.
//!
//! ## Wire format (little-endian)
//!
//! ```text
//! sequence_id:   u16  (2)   per datagram, wraps at 65536
//! frame_id:      u16  (2)   per video frame, wraps at 65536
//! total_chunks:  u16  (2)   data chunks in the frame
//! chunk_index:   u16  (2)   data index, or 0xF000 / 0xF001 parity sentinel
//! flags:         u32  (4)   see [`PacketFlags`]
//! ```
//!
//! The payload follows the header and runs to the end of the datagram.

use crate::error::CastError;
use crate::flags::PacketFlags;

/// Encoded header size on the wire.
pub const HEADER_SIZE: usize = 12;

/// Chunk indices at or above this value are never data chunks.
pub const PARITY_INDEX_BASE: u16 = 0xF000;

/// Chunk index carried by the even-partition parity datagram.
pub const PARITY_EVEN_INDEX: u16 = PARITY_INDEX_BASE;

/// Chunk index carried by the odd-partition parity datagram.
pub const PARITY_ODD_INDEX: u16 = 0xF001;

// ── Partition ────────────────────────────────────────────────────

/// One of the two disjoint parity groups of a frame's data chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Chunks at indices 0, 2, 4, …
    Even,
    /// Chunks at indices 1, 3, 5, …
    Odd,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Even, Partition::Odd];

    /// Partition a data chunk index belongs to.
    pub fn of(index: usize) -> Self {
        if index % 2 == 0 {
            Partition::Even
        } else {
            Partition::Odd
        }
    }

    /// Slot in the parity array (0 = even, 1 = odd).
    pub const fn slot(self) -> usize {
        match self {
            Partition::Even => 0,
            Partition::Odd => 1,
        }
    }

    /// Sentinel chunk index used on the wire for this partition's parity.
    pub const fn sentinel(self) -> u16 {
        match self {
            Partition::Even => PARITY_EVEN_INDEX,
            Partition::Odd => PARITY_ODD_INDEX,
        }
    }

    /// Whether `index` is a member of this partition.
    pub fn contains(self, index: usize) -> bool {
        Partition::of(index) == self
    }
}

// ── ChunkKind ────────────────────────────────────────────────────

/// What a datagram's `chunk_index` refers to, relative to a frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// A data chunk at this index.
    Data(usize),
    /// A parity chunk for the given partition.
    Parity(Partition),
    /// Out of range and not a parity sentinel.
    Unknown(u16),
}

impl ChunkKind {
    /// Classify `chunk_index` for a frame holding `total_chunks` data slots.
    pub fn classify(chunk_index: u16, total_chunks: usize) -> Self {
        match chunk_index {
            PARITY_EVEN_INDEX => ChunkKind::Parity(Partition::Even),
            PARITY_ODD_INDEX => ChunkKind::Parity(Partition::Odd),
            i if i < PARITY_INDEX_BASE && (i as usize) < total_chunks => {
                ChunkKind::Data(i as usize)
            }
            i => ChunkKind::Unknown(i),
        }
    }
}

// ── PacketHeader ─────────────────────────────────────────────────

/// Decoded datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence_id: u16,
    pub frame_id: u16,
    pub total_chunks: u16,
    pub chunk_index: u16,
    pub flags: PacketFlags,
}

impl PacketHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = HEADER_SIZE;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.sequence_id.to_le_bytes());
        buf[2..4].copy_from_slice(&self.frame_id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.total_chunks.to_le_bytes());
        buf[6..8].copy_from_slice(&self.chunk_index.to_le_bytes());
        buf[8..12].copy_from_slice(&self.flags.bits().to_le_bytes());
        buf
    }

    /// Deserialize from the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// Any input of at least 12 bytes decodes; field ranges are not
    /// validated and unknown flag bits are retained.
    pub fn decode(data: &[u8]) -> Result<Self, CastError> {
        let Some(raw) = data.first_chunk::<HEADER_SIZE>() else {
            return Err(CastError::TooShort { len: data.len() });
        };
        Ok(Self {
            sequence_id: u16::from_le_bytes([raw[0], raw[1]]),
            frame_id: u16::from_le_bytes([raw[2], raw[3]]),
            total_chunks: u16::from_le_bytes([raw[4], raw[5]]),
            chunk_index: u16::from_le_bytes([raw[6], raw[7]]),
            flags: PacketFlags::from_bits_retain(u32::from_le_bytes([
                raw[8], raw[9], raw[10], raw[11],
            ])),
        })
    }

    /// Classify this header's chunk index against its own declared total.
    pub fn chunk_kind(&self) -> ChunkKind {
        ChunkKind::classify(self.chunk_index, self.total_chunks as usize)
    }

    pub fn is_keyframe(&self) -> bool {
        self.flags.is_keyframe()
    }

    pub fn is_control(&self) -> bool {
        self.flags.is_control()
    }
}

// ── Tests ────────────────────────────────────────────────────────
