//! Shared value types for the mapping pipeline
//!
//! Seed keys, postings, stranded read identifiers and the per-read bookkeeping
//! that survives across the whole genome scan.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A DNA k-mer of at most 16 bases packed two bits per base.
pub type SeedKey = u32;

/// Key value that the genome scan never looks up.
///
/// It is also the encoding of the all-`A` k-mer, so poly-A seeds are never
/// matched on the genome side.
pub const BAD_KEY: SeedKey = 0;

/// Largest number of bases a [`SeedKey`] can hold.
pub const MAX_KEY_WEIGHT: usize = 16;

/// Strand orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Strand {
    #[default]
    Forward,
    Reverse,
}

impl From<bool> for Strand {
    fn from(forward: bool) -> Self {
        if forward {
            Strand::Forward
        } else {
            Strand::Reverse
        }
    }
}

impl From<Strand> for bool {
    fn from(strand: Strand) -> Self {
        matches!(strand, Strand::Forward)
    }
}

impl From<char> for Strand {
    fn from(c: char) -> Self {
        match c {
            '+' => Strand::Forward,
            '-' => Strand::Reverse,
            _ => Strand::Forward, // Default to forward
        }
    }
}

impl From<Strand> for char {
    fn from(strand: Strand) -> Self {
        match strand {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

/// A read identifier together with the strand it was seeded from.
///
/// The derived ordering sorts by read first and puts `Forward` before
/// `Reverse`, which is the order the collator drains match streams in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct StrandedId {
    pub read: u32,
    pub strand: Strand,
}

impl StrandedId {
    pub fn forward(read: u32) -> Self {
        Self { read, strand: Strand::Forward }
    }

    pub fn reverse(read: u32) -> Self {
        Self { read, strand: Strand::Reverse }
    }
}

impl fmt::Display for StrandedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.read, char::from(self.strand))
    }
}

/// One occurrence of a seed key inside a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Posting {
    pub sequence: StrandedId,
    /// Offset of the seed in the (possibly reverse complemented) read
    pub offset: u16,
}

/// Vertical (read) and horizontal (window) offsets of a seed hit.
///
/// Ordered by vertical offset, then horizontal offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OffsetPair {
    pub vertical: u16,
    pub horizontal: u16,
}

impl OffsetPair {
    pub fn new(vertical: u16, horizontal: u16) -> Self {
        Self { vertical, horizontal }
    }

    /// Horizontal minus vertical offset
    pub fn diagonal(&self) -> i32 {
        self.horizontal as i32 - self.vertical as i32
    }
}

/// Per-read state carried across the genome scan.
///
/// Scores only ever increase while scanning; the output filter reads the final
/// values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequenceInfo {
    pub length: u32,
    pub best_anchoring_score: i32,
    pub best_sw_score: i32,
    pub best_skeleton_score: i32,
    pub best_score_mappings: u32,
    /// Index of the chromosome holding the best mapping so far
    pub best_chrom: Option<usize>,
    pub best_start: i64,
    pub passing_mappings: u32,
}

impl SequenceInfo {
    pub fn new(length: usize) -> Self {
        Self {
            length: length as u32,
            ..Default::default()
        }
    }
}

/// Counters collected during one genome scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanStats {
    /// Chained seed groups
    pub ksw_calls: u64,
    /// Banded alignments run
    pub sw_calls: u64,
    /// Banded alignments that fell below the score threshold
    pub failed_sw_calls: u64,
    pub really_poor_anchorings: u64,
    pub skeleton_rejects: u64,
    pub predicted_skeleton_rejects: u64,
    pub mappings_written: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stranded_id_ordering() {
        let mut ids = vec![
            StrandedId::reverse(1),
            StrandedId::forward(2),
            StrandedId::forward(1),
            StrandedId::reverse(0),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                StrandedId::reverse(0),
                StrandedId::forward(1),
                StrandedId::reverse(1),
                StrandedId::forward(2),
            ]
        );
    }

    #[test]
    fn test_offset_pair_ordering_and_diagonal() {
        let a = OffsetPair::new(0, 9);
        let b = OffsetPair::new(1, 0);
        assert!(a < b);
        assert_eq!(a.diagonal(), 9);
        assert_eq!(b.diagonal(), -1);
    }

    #[test]
    fn test_strand_conversions() {
        assert_eq!(Strand::from('+'), Strand::Forward);
        assert_eq!(Strand::from('-'), Strand::Reverse);
        assert_eq!(char::from(Strand::Reverse), '-');
        assert!(bool::from(Strand::Forward));
        assert_eq!(StrandedId::reverse(7).to_string(), "7-");
    }
}
