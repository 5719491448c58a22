//! Sequence-id duplicate filter.
//!
//! Remembers every sequence id it has seen until the set grows past
//! [`DEDUP_CAPACITY`], then forgets everything at once and starts over.
//! After a reset a replayed datagram is accepted again; the frame buffer
//! tolerates that because re-inserting a filled slot is a no-op.

use std::collections::HashSet;

/// Number of remembered ids above which the cache is cleared.
pub const DEDUP_CAPACITY: usize = 1000;

/// Result of offering a sequence id to the deduplicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqVerdict {
    /// First sighting; the datagram should be processed.
    Fresh,
    /// First sighting, and the cache overflowed and was cleared.
    FreshAfterReset,
    /// Already seen; the datagram should be dropped.
    Duplicate,
}

impl SeqVerdict {
    pub fn is_duplicate(self) -> bool {
        self == SeqVerdict::Duplicate
    }
}

/// Bounded set of recently observed sequence ids.
#[derive(Debug)]
pub struct SequenceDeduplicator {
    seen: HashSet<u16>,
    capacity: usize,
}

impl SequenceDeduplicator {
    /// Create a deduplicator with the standard capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEDUP_CAPACITY)
    }

    /// Create a deduplicator that clears once it holds more than `capacity` ids.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Record `sequence_id`, reporting whether it was already present.
    pub fn observe(&mut self, sequence_id: u16) -> SeqVerdict {
        if !self.seen.insert(sequence_id) {
            return SeqVerdict::Duplicate;
        }
        if self.seen.len() > self.capacity {
            self.seen.clear();
            return SeqVerdict::FreshAfterReset;
        }
        SeqVerdict::Fresh
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for SequenceDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_repeats() {
        let mut dedup = SequenceDeduplicator::new();
        assert_eq!(dedup.observe(42), SeqVerdict::Fresh);
        assert_eq!(dedup.observe(42), SeqVerdict::Duplicate);
        assert_eq!(dedup.observe(43), SeqVerdict::Fresh);
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn clears_entirely_past_capacity() {
        let mut dedup = SequenceDeduplicator::new();
        for seq in 0..DEDUP_CAPACITY as u16 {
            assert_eq!(dedup.observe(seq), SeqVerdict::Fresh);
        }
        assert_eq!(dedup.len(), DEDUP_CAPACITY);

        // The 1001st distinct id overflows the cache.
        assert_eq!(
            dedup.observe(DEDUP_CAPACITY as u16),
            SeqVerdict::FreshAfterReset
        );
        assert!(dedup.is_empty());

        // Everything is forgotten, including the id that triggered the reset.
        assert_eq!(dedup.observe(0), SeqVerdict::Fresh);
        assert_eq!(dedup.observe(DEDUP_CAPACITY as u16), SeqVerdict::Fresh);
    }

    #[test]
    fn duplicates_do_not_grow_the_cache() {
        let mut dedup = SequenceDeduplicator::with_capacity(3);
        for _ in 0..10 {
            dedup.observe(1);
        }
        assert_eq!(dedup.len(), 1);
    }
}
