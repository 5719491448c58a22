//! Single-erasure XOR forward error correction.
//!
//! Each frame carries two parity chunks: the XOR of its even-indexed
//! data chunks and the XOR of its odd-indexed data chunks, each padded
//! with zeros to the longest member of its partition. Any one missing
//! chunk per partition is recovered as
//!
//! ```text
//! missing = parity ⊕ (every other present chunk of the same partition)
//! ```
//!
//! Two losses inside the same partition cannot be recovered.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::frame::FrameEntry;
use crate::header::Partition;

// ── RepairSizing ─────────────────────────────────────────────────

/// How long a reconstructed chunk is made.
///
/// XOR parity does not record the length of the chunk it protects, so
/// the repaired length is an estimate either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairSizing {
    /// Use the partition's parity length. Exact whenever the missing
    /// chunk is the longest in its partition; a short final chunk comes
    /// back with trailing zeros.
    #[default]
    ParityLength,
    /// Use the longest data chunk present anywhere in the frame. With no
    /// data chunk present nothing is rebuilt, and the frame is delivered
    /// with only the chunks it has (possibly none).
    LongestPresent,
}

// ── Byte helpers ─────────────────────────────────────────────────

/// XOR `src` into `dst` over the shorter of the two lengths.
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= *s;
    }
}

/// Parity of `chunks`, sized to the longest of them.
///
/// Shorter chunks behave as if zero-padded. An empty input yields an
/// empty parity chunk.
pub fn parity_of<'a, I>(chunks: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut parity = Vec::new();
    for chunk in chunks {
        if chunk.len() > parity.len() {
            parity.resize(chunk.len(), 0);
        }
        xor_into(&mut parity, chunk);
    }
    parity
}

// ── Repair ───────────────────────────────────────────────────────

/// Summary of one [`repair`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Number of chunks reconstructed (0, 1 or 2).
    pub rebuilt: usize,
}

/// Rebuild the missing chunk of every partition that lacks exactly one.
///
/// Partitions with no gap, or with more than one, are left untouched,
/// as are partitions whose parity chunk has not arrived.
pub fn repair(entry: &mut FrameEntry, sizing: RepairSizing) -> RepairReport {
    let mut report = RepairReport::default();
    let longest = entry.longest_present();

    for partition in Partition::ALL {
        let gap = {
            let mut missing = entry.missing_in(partition);
            (missing.next(), missing.next())
        };
        let (Some(index), None) = gap else {
            continue;
        };
        let Some(parity) = entry.parity(partition) else {
            continue;
        };

        let len = match sizing {
            RepairSizing::ParityLength => parity.len(),
            RepairSizing::LongestPresent => match longest {
                Some(len) => len,
                None => continue,
            },
        };

        let mut rebuilt = vec![0u8; len];
        let n = parity.len().min(len);
        rebuilt[..n].copy_from_slice(&parity[..n]);
        for (_, sibling) in entry.present_in(partition) {
            xor_into(&mut rebuilt, sibling);
        }

        trace!(index, len, ?partition, "rebuilt chunk from parity");
        if entry.fill(index, Bytes::from(rebuilt)) {
            report.rebuilt += 1;
        }
    }

    report
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::PacketFlags;
    use crate::header::PacketHeader;

    fn chunk(i: usize, len: usize) -> Vec<u8> {
        (0..len).map(|j| (i * 31 + j * 7) as u8).collect()
    }

    /// Build an entry holding `chunks` minus the `drop` indices, plus both parities.
    fn entry_with(chunks: &[Vec<u8>], drop: &[usize]) -> FrameEntry {
        let total = chunks.len() as u16;
        let mut entry = FrameEntry::new(total);
        let mut hdr = PacketHeader {
            sequence_id: 0,
            frame_id: 0,
            total_chunks: total,
            chunk_index: 0,
            flags: PacketFlags::empty(),
        };
        for (i, c) in chunks.iter().enumerate() {
            if !drop.contains(&i) {
                hdr.chunk_index = i as u16;
                entry.insert(&hdr, Bytes::from(c.clone()));
            }
        }
        for partition in Partition::ALL {
            let parity = parity_of(
                chunks
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| partition.contains(*i))
                    .map(|(_, c)| c.as_slice()),
            );
            hdr.chunk_index = partition.sentinel();
            entry.insert(&hdr, Bytes::from(parity));
        }
        entry
    }

    #[test]
    fn xor_uses_shorter_length() {
        let mut dst = vec![0xFF, 0xFF, 0xFF];
        xor_into(&mut dst, &[0x0F]);
        assert_eq!(dst, vec![0xF0, 0xFF, 0xFF]);
    }

    #[test]
    fn parity_pads_to_longest() {
        let p = parity_of([&[1u8, 2, 3][..], &[1u8][..]]);
        assert_eq!(p, vec![0, 2, 3]);
        assert!(parity_of(std::iter::empty::<&[u8]>()).is_empty());
    }

    #[test]
    fn rebuilds_one_even_and_one_odd() {
        let chunks: Vec<Vec<u8>> = (0..6).map(|i| chunk(i, 64)).collect();
        let mut entry = entry_with(&chunks, &[2, 5]);
        assert!(entry.can_be_repaired());
        assert!(!entry.is_complete());

        let report = repair(&mut entry, RepairSizing::ParityLength);
        assert_eq!(report.rebuilt, 2);
        assert!(entry.is_complete());
        assert_eq!(entry.chunk(2).unwrap().as_ref(), chunks[2].as_slice());
        assert_eq!(entry.chunk(5).unwrap().as_ref(), chunks[5].as_slice());
    }

    #[test]
    fn rebuilds_with_longest_present_sizing() {
        let chunks: Vec<Vec<u8>> = (0..4).map(|i| chunk(i, 32)).collect();
        let mut entry = entry_with(&chunks, &[0]);
        let report = repair(&mut entry, RepairSizing::LongestPresent);
        assert_eq!(report.rebuilt, 1);
        assert_eq!(entry.assemble().len(), 128);
        assert_eq!(entry.chunk(0).unwrap().as_ref(), chunks[0].as_slice());
    }

    #[test]
    fn short_final_chunk_is_recovered_exactly_when_alone_in_partition() {
        // Two chunks: the odd partition holds only the short tail.
        let chunks = vec![chunk(0, 100), chunk(1, 40)];
        let mut entry = entry_with(&chunks, &[1]);
        repair(&mut entry, RepairSizing::ParityLength);
        assert_eq!(entry.chunk(1).unwrap().as_ref(), chunks[1].as_slice());
    }

    #[test]
    fn short_final_chunk_gets_zero_tail_otherwise() {
        let chunks = vec![chunk(0, 50), chunk(1, 50), chunk(2, 20)];
        let mut entry = entry_with(&chunks, &[2]);
        repair(&mut entry, RepairSizing::ParityLength);
        let rebuilt = entry.chunk(2).unwrap();
        assert_eq!(rebuilt.len(), 50);
        assert_eq!(&rebuilt[..20], chunks[2].as_slice());
        assert!(rebuilt[20..].iter().all(|&b| b == 0));
    }

    #[test]
    fn leaves_double_loss_partition_alone() {
        let chunks: Vec<Vec<u8>> = (0..6).map(|i| chunk(i, 16)).collect();
        let mut entry = entry_with(&chunks, &[0, 2, 3]);
        assert!(!entry.can_be_repaired());

        let report = repair(&mut entry, RepairSizing::ParityLength);
        // The odd gap is still fixable on its own.
        assert_eq!(report.rebuilt, 1);
        assert_eq!(entry.chunk(3).unwrap().as_ref(), chunks[3].as_slice());
        assert!(entry.chunk(0).is_none());
        assert!(entry.chunk(2).is_none());
    }

    #[test]
    fn longest_present_rebuilds_nothing_without_data() {
        let chunks = vec![chunk(0, 24), chunk(1, 24)];
        let mut entry = entry_with(&chunks, &[0, 1]);
        assert!(entry.can_be_repaired());

        let report = repair(&mut entry, RepairSizing::LongestPresent);
        assert_eq!(report.rebuilt, 0);
        assert!(entry.assemble().is_empty());

        let mut entry = entry_with(&chunks, &[0, 1]);
        assert_eq!(repair(&mut entry, RepairSizing::ParityLength).rebuilt, 2);
        assert_eq!(entry.assemble().len(), 48);
    }
}
