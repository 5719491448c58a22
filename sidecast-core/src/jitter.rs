//! Jitter buffer: frame assembly plus delivery scheduling.
//!
//! Holds at most [`MAX_BUFFERED_FRAMES`] in-flight frames keyed by frame
//! id. Every insertion is followed by an eviction pass that drops the
//! numerically lowest ids until the buffer is back at capacity; delivery
//! scans ids in ascending order and hands out the first frame that is
//! complete or repairable.
//!
//! Ids are compared as plain integers. Across the 65535 → 0 wrap the
//! freshly wrapped frames sort first, so they are delivered ahead of
//! (and evicted ahead of) the last frames before the wrap.
//!
//! Ids of the last [`DELIVERED_HISTORY`] delivered frames are remembered
//! so that stragglers (typically the parity datagrams, which the host
//! sends last) cannot recreate an entry and get the frame delivered twice.
//!
//! The buffer is owned by exactly one consumer and does no locking.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use tracing::debug;

use crate::fec::{self, RepairSizing};
use crate::frame::{ChunkOutcome, FrameEntry};
use crate::header::PacketHeader;

/// Live frame entries kept before the oldest are evicted.
pub const MAX_BUFFERED_FRAMES: usize = 5;

/// Delivered frame ids remembered for rejecting late chunks.
pub const DELIVERED_HISTORY: usize = 32;

// ── ReadyFrame ───────────────────────────────────────────────────

/// A fully assembled frame handed to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyFrame {
    pub frame_id: u16,
    /// Data chunks concatenated in index order.
    pub data: Bytes,
    /// Whether any datagram of the frame carried the keyframe flag.
    /// Feeds the statistics; the decoder gets the completing datagram's flag.
    pub is_keyframe: bool,
    /// Chunks rebuilt from parity (0 for frames that arrived whole).
    pub repaired_chunks: usize,
}

// ── InsertReport ─────────────────────────────────────────────────

/// Effect of one [`JitterBuffer::insert`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReport {
    pub outcome: ChunkOutcome,
    /// A new entry was created for this frame id.
    pub created: bool,
    /// Entries discarded by the eviction pass that followed.
    pub evicted: usize,
}

// ── JitterBuffer ─────────────────────────────────────────────────

/// Bounded set of partially received frames.
#[derive(Debug)]
pub struct JitterBuffer {
    frames: BTreeMap<u16, FrameEntry>,
    delivered: VecDeque<u16>,
    capacity: usize,
    sizing: RepairSizing,
}

impl JitterBuffer {
    /// Create a buffer holding up to [`MAX_BUFFERED_FRAMES`] frames.
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFERED_FRAMES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: BTreeMap::new(),
            delivered: VecDeque::with_capacity(DELIVERED_HISTORY),
            capacity,
            sizing: RepairSizing::default(),
        }
    }

    /// Choose how repaired chunks are sized.
    pub fn with_repair_sizing(mut self, sizing: RepairSizing) -> Self {
        self.sizing = sizing;
        self
    }

    /// Store one data or parity chunk, then evict if over capacity.
    ///
    /// The entry for `header.frame_id` is created on first sight, sized by
    /// `header.total_chunks`. Chunks of recently delivered frames are
    /// dropped as [`ChunkOutcome::Late`].
    pub fn insert(&mut self, header: &PacketHeader, payload: Bytes) -> InsertReport {
        if self.delivered.contains(&header.frame_id) {
            return InsertReport {
                outcome: ChunkOutcome::Late,
                created: false,
                evicted: 0,
            };
        }

        let mut created = false;
        let entry = self.frames.entry(header.frame_id).or_insert_with(|| {
            created = true;
            FrameEntry::new(header.total_chunks)
        });
        let outcome = entry.insert(header, payload);
        let evicted = self.evict_if_over_capacity();

        InsertReport {
            outcome,
            created,
            evicted,
        }
    }

    /// Drop the lowest frame ids until at most `capacity` entries remain.
    ///
    /// Returns the number of entries removed.
    pub fn evict_if_over_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.frames.len() > self.capacity {
            let Some((frame_id, entry)) = self.frames.pop_first() else {
                break;
            };
            debug!(
                frame_id,
                received = entry.received_count(),
                total = entry.total_chunks(),
                "evicted incomplete frame"
            );
            evicted += 1;
        }
        evicted
    }

    /// Remove and return the lowest-id frame that is complete or repairable.
    ///
    /// Frames that can never be completed are skipped, not removed; they
    /// stay until eviction pushes them out.
    pub fn next_ready_frame(&mut self) -> Option<ReadyFrame> {
        let frame_id = self
            .frames
            .iter()
            .find(|(_, entry)| entry.is_complete() || entry.can_be_repaired())
            .map(|(id, _)| *id)?;
        let mut entry = self.frames.remove(&frame_id)?;
        if self.delivered.len() == DELIVERED_HISTORY {
            self.delivered.pop_front();
        }
        self.delivered.push_back(frame_id);

        let repaired_chunks = if entry.is_complete() {
            0
        } else {
            fec::repair(&mut entry, self.sizing).rebuilt
        };

        Some(ReadyFrame {
            frame_id,
            data: entry.assemble(),
            is_keyframe: entry.is_keyframe(),
            repaired_chunks,
        })
    }

    /// Number of live frame entries.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Look at a live entry without removing it.
    pub fn entry(&self, frame_id: u16) -> Option<&FrameEntry> {
        self.frames.get(&frame_id)
    }

    /// Live frame ids in ascending order.
    pub fn frame_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.frames.keys().copied()
    }
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
