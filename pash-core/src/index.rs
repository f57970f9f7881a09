//! Collapsed seed index ("hive hash")
//!
//! The index is built in two phases. During sizing every seed occurrence is
//! counted with [`CollapsedSeedIndex::mark`]. [`CollapsedSeedIndex::allocate`]
//! then prunes the most repetitive keys and carves an exactly sized bin for
//! every surviving key out of a pooled arena. The fill phase appends postings
//! with [`CollapsedSeedIndex::insert`].
//!
//! A single slot array serves both phases: it holds occurrence counts while
//! sizing and `bin index + 1` (0 for absent) once allocated.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Posting, SeedKey, MAX_KEY_WEIGHT};

/// Postings per pool block
pub const POOL_BLOCK_SIZE: usize = 1 << 19;

const HISTOGRAM_BUCKETS: usize = 250_000;

/// Heaviest key weight the slot table is allocated for (`4^14` slots, 1 GiB)
pub const MAX_INDEX_WEIGHT: usize = 14;

/// Errors raised while building or filling the index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid key weight {0}: must be between 1 and 16")]
    InvalidWeight(usize),

    #[error("A weight {weight} index needs a {bytes} byte slot table; the limit is weight {max}", max = MAX_INDEX_WEIGHT)]
    TableTooLarge { weight: usize, bytes: u64 },

    #[error("Key {key} out of range for weight {weight}")]
    KeyOutOfRange { key: SeedKey, weight: usize },

    #[error("Operation '{operation}' is not allowed during the {phase:?} phase")]
    WrongPhase { operation: &'static str, phase: IndexPhase },

    #[error("Key {0} has no bin (pruned or never marked)")]
    AbsentBin(SeedKey),

    #[error("Bin for key {key} is full ({capacity} postings)")]
    BinFull { key: SeedKey, capacity: u32 },
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Construction phase of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexPhase {
    Sizing,
    Filling,
}

/// Summary of an allocated index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub key_weight: usize,
    pub keys_present: u64,
    pub keys_pruned: u64,
    /// Largest occurrence count a key may have and stay present
    pub threshold: u32,
    /// Total postings the bins were sized for
    pub capacity: u64,
    /// Postings inserted so far
    pub postings: u64,
}

#[derive(Debug, Clone, Copy)]
struct Bin {
    block: u32,
    start: u32,
    capacity: u32,
    len: u32,
}

/// Two-phase, percentile-pruned seed index
#[derive(Debug)]
pub struct CollapsedSeedIndex {
    key_weight: usize,
    keep_percent: u32,
    phase: IndexPhase,
    slots: Vec<u32>,
    bins: Vec<Bin>,
    pool: Vec<Vec<Posting>>,
    stats: IndexStats,
}

impl CollapsedSeedIndex {
    /// Create an index addressing `4^key_weight` keys.
    ///
    /// `keep_percent` is the share of all seed occurrences the pruning keeps.
    pub fn new(key_weight: usize, keep_percent: u32) -> IndexResult<Self> {
        Self::check_weight(key_weight)?;
        let count = 1usize << (2 * key_weight);
        let mut slots = Vec::new();
        slots.try_reserve_exact(count).map_err(|_| IndexError::TableTooLarge {
            weight: key_weight,
            bytes: Self::table_bytes(key_weight),
        })?;
        slots.resize(count, 0);
        Ok(Self {
            key_weight,
            keep_percent,
            phase: IndexPhase::Sizing,
            slots,
            bins: Vec::new(),
            pool: Vec::new(),
            stats: IndexStats {
                key_weight,
                ..Default::default()
            },
        })
    }

    /// Reject weights that are out of range or whose slot table is too large
    pub fn check_weight(key_weight: usize) -> IndexResult<()> {
        if key_weight == 0 || key_weight > MAX_KEY_WEIGHT {
            return Err(IndexError::InvalidWeight(key_weight));
        }
        if key_weight > MAX_INDEX_WEIGHT {
            return Err(IndexError::TableTooLarge {
                weight: key_weight,
                bytes: Self::table_bytes(key_weight),
            });
        }
        Ok(())
    }

    fn table_bytes(key_weight: usize) -> u64 {
        (1u64 << (2 * key_weight)) * std::mem::size_of::<u32>() as u64
    }

    pub fn key_weight(&self) -> usize {
        self.key_weight
    }

    pub fn phase(&self) -> IndexPhase {
        self.phase
    }

    fn slot(&self, key: SeedKey) -> IndexResult<usize> {
        let slot = key as usize;
        if slot >= self.slots.len() {
            return Err(IndexError::KeyOutOfRange {
                key,
                weight: self.key_weight,
            });
        }
        Ok(slot)
    }

    /// Count one occurrence of `key` (sizing phase only)
    pub fn mark(&mut self, key: SeedKey) -> IndexResult<()> {
        if self.phase != IndexPhase::Sizing {
            return Err(IndexError::WrongPhase {
                operation: "mark",
                phase: self.phase,
            });
        }
        let slot = self.slot(key)?;
        self.slots[slot] = self.slots[slot].saturating_add(1);
        Ok(())
    }

    /// Prune repetitive keys and size the bins of the surviving ones
    pub fn allocate(&mut self) -> IndexResult<()> {
        if self.phase != IndexPhase::Sizing {
            return Err(IndexError::WrongPhase {
                operation: "allocate",
                phase: self.phase,
            });
        }

        let mut occurrences = vec![0u64; HISTOGRAM_BUCKETS];
        let mut frequencies = vec![0u64; HISTOGRAM_BUCKETS];
        let mut total: u64 = 0;
        for &count in self.slots.iter().filter(|c| **c > 0) {
            let bucket = ((count / 2) as usize).min(HISTOGRAM_BUCKETS - 1);
            occurrences[bucket] += count as u64;
            frequencies[bucket] += 1;
            total += count as u64;
        }

        let threshold = if total == 0 {
            0
        } else {
            let keep = self.keep_percent as u64;
            let mut cumulative = 0u64;
            let mut threshold = u32::MAX;
            for (bucket, occ) in occurrences.iter().enumerate() {
                cumulative += occ;
                if cumulative * 100 >= keep * total {
                    threshold = 2 * bucket as u32 + 1;
                    debug!(
                        "Seed histogram cutoff at bucket {} ({} keys in bucket), threshold {}",
                        bucket, frequencies[bucket], threshold
                    );
                    break;
                }
            }
            threshold
        };

        let mut current_block: Option<(usize, usize)> = None;
        let mut block_sizes: Vec<usize> = Vec::new();
        let mut keys_present = 0u64;
        let mut keys_pruned = 0u64;
        let mut capacity_total = 0u64;

        for slot in self.slots.iter_mut() {
            let count = *slot;
            if count == 0 {
                continue;
            }
            if total == 0 || count > threshold {
                *slot = 0;
                keys_pruned += 1;
                continue;
            }

            let size = count as usize;
            let (block, start) = if size > POOL_BLOCK_SIZE {
                block_sizes.push(size);
                (block_sizes.len() - 1, 0)
            } else {
                match current_block.take() {
                    Some((block, used)) if used + size <= POOL_BLOCK_SIZE => {
                        current_block = Some((block, used + size));
                        block_sizes[block] = used + size;
                        (block, used)
                    }
                    _ => {
                        block_sizes.push(size);
                        let block = block_sizes.len() - 1;
                        current_block = Some((block, size));
                        (block, 0)
                    }
                }
            };

            self.bins.push(Bin {
                block: block as u32,
                start: start as u32,
                capacity: count,
                len: 0,
            });
            *slot = self.bins.len() as u32;
            keys_present += 1;
            capacity_total += count as u64;
        }

        self.pool = block_sizes
            .into_iter()
            .map(|size| vec![Posting::default(); size])
            .collect();
        self.phase = IndexPhase::Filling;
        self.stats = IndexStats {
            key_weight: self.key_weight,
            keys_present,
            keys_pruned,
            threshold,
            capacity: capacity_total,
            postings: 0,
        };
        Ok(())
    }

    fn bin_index(&self, key: SeedKey) -> Option<usize> {
        match self.slots.get(key as usize) {
            Some(&slot) if slot > 0 => Some(slot as usize - 1),
            _ => None,
        }
    }

    /// Append a posting to the bin of `key` (fill phase only)
    pub fn insert(&mut self, key: SeedKey, posting: Posting) -> IndexResult<()> {
        if self.phase != IndexPhase::Filling {
            return Err(IndexError::WrongPhase {
                operation: "insert",
                phase: self.phase,
            });
        }
        self.slot(key)?;
        let bin_index = self.bin_index(key).ok_or(IndexError::AbsentBin(key))?;
        let bin = &mut self.bins[bin_index];
        if bin.len >= bin.capacity {
            return Err(IndexError::BinFull {
                key,
                capacity: bin.capacity,
            });
        }
        self.pool[bin.block as usize][(bin.start + bin.len) as usize] = posting;
        bin.len += 1;
        self.stats.postings += 1;
        Ok(())
    }

    /// Postings of `key` in insertion order, `None` when absent or empty
    pub fn postings(&self, key: SeedKey) -> Option<&[Posting]> {
        if self.phase != IndexPhase::Filling {
            return None;
        }
        let bin = self.bins[self.bin_index(key)?];
        if bin.len == 0 {
            return None;
        }
        let start = bin.start as usize;
        Some(&self.pool[bin.block as usize][start..start + bin.len as usize])
    }

    /// Whether `key` owns a bin
    pub fn is_present(&self, key: SeedKey) -> bool {
        self.phase == IndexPhase::Filling && self.bin_index(key).is_some()
    }

    /// Occurrence count of `key`: the running mark count while sizing, the
    /// bin capacity afterwards (0 for pruned keys)
    pub fn count(&self, key: SeedKey) -> u32 {
        match self.phase {
            IndexPhase::Sizing => self.slots.get(key as usize).copied().unwrap_or(0),
            IndexPhase::Filling => self
                .bin_index(key)
                .map(|i| self.bins[i].capacity)
                .unwrap_or(0),
        }
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::encode;
    use crate::types::StrandedId;

    fn posting(read: u32, offset: u16) -> Posting {
        Posting {
            sequence: StrandedId::forward(read),
            offset,
        }
    }

    #[test]
    fn test_single_key_scenario() {
        let mut index = CollapsedSeedIndex::new(4, 100).unwrap();
        let key = encode(b"AAAA");
        for _ in 0..3 {
            index.mark(key).unwrap();
        }
        index.allocate().unwrap();
        for read in 0..3 {
            index.insert(key, posting(read, 0)).unwrap();
        }

        let stats = index.stats();
        assert_eq!(stats.keys_present, 1);
        assert_eq!(stats.postings, 3);
        let postings = index.postings(key).unwrap();
        assert_eq!(postings.len(), 3);
        assert_eq!(postings[2].sequence.read, 2);
    }

    #[test]
    fn test_phase_errors() {
        let mut index = CollapsedSeedIndex::new(2, 99).unwrap();
        assert!(matches!(
            index.insert(1, posting(0, 0)),
            Err(IndexError::WrongPhase { .. })
        ));
        index.mark(1).unwrap();
        index.allocate().unwrap();
        assert!(matches!(index.mark(1), Err(IndexError::WrongPhase { .. })));
        assert!(matches!(index.allocate(), Err(IndexError::WrongPhase { .. })));
    }

    #[test]
    fn test_absent_and_full_bins() {
        let mut index = CollapsedSeedIndex::new(2, 100).unwrap();
        index.mark(3).unwrap();
        index.allocate().unwrap();
        assert!(matches!(index.insert(5, posting(0, 0)), Err(IndexError::AbsentBin(5))));
        index.insert(3, posting(0, 0)).unwrap();
        assert!(matches!(
            index.insert(3, posting(1, 0)),
            Err(IndexError::BinFull { key: 3, capacity: 1 })
        ));
        assert!(matches!(
            index.insert(16, posting(0, 0)),
            Err(IndexError::KeyOutOfRange { .. })
        ));
    }

    #[test]
    fn test_repetitive_key_is_pruned() {
        let mut index = CollapsedSeedIndex::new(4, 90).unwrap();
        // 200 unique keys and one key seen 10 times
        for key in 1..=200 {
            index.mark(key).unwrap();
        }
        for _ in 0..10 {
            index.mark(255).unwrap();
        }
        index.allocate().unwrap();
        assert!(!index.is_present(255));
        assert!(index.postings(255).is_none());
        assert_eq!(index.count(255), 0);
        assert!(index.is_present(7));
        assert_eq!(index.count(7), 1);
        assert_eq!(index.stats().keys_pruned, 1);
        assert_eq!(index.stats().threshold, 1);
    }

    #[test]
    fn test_higher_keep_percent_keeps_more_keys() {
        let build = |keep: u32| {
            let mut index = CollapsedSeedIndex::new(4, keep).unwrap();
            for key in 1..=50u32 {
                for _ in 0..key {
                    index.mark(key).unwrap();
                }
            }
            index.allocate().unwrap();
            index.stats().keys_present
        };
        let mut previous = 0;
        for keep in 90..=100 {
            let present = build(keep);
            assert!(present >= previous);
            previous = present;
        }
        assert_eq!(previous, 50);
    }

    #[test]
    fn test_empty_index_has_no_keys() {
        let mut index = CollapsedSeedIndex::new(4, 99).unwrap();
        index.allocate().unwrap();
        assert_eq!(index.stats().keys_present, 0);
        assert!(index.postings(0).is_none());
    }

    #[test]
    fn test_present_but_unfilled_bin_yields_none() {
        let mut index = CollapsedSeedIndex::new(2, 100).unwrap();
        index.mark(2).unwrap();
        index.allocate().unwrap();
        assert!(index.is_present(2));
        assert!(index.postings(2).is_none());
    }

    #[test]
    fn test_invalid_weight() {
        assert!(matches!(CollapsedSeedIndex::new(0, 99), Err(IndexError::InvalidWeight(0))));
        assert!(matches!(CollapsedSeedIndex::new(17, 99), Err(IndexError::InvalidWeight(17))));
    }

    #[test]
    fn test_oversized_table_is_rejected() {
        assert!(matches!(
            CollapsedSeedIndex::new(16, 99),
            Err(IndexError::TableTooLarge { weight: 16, bytes }) if bytes == 1 << 34
        ));
        assert!(matches!(
            CollapsedSeedIndex::check_weight(15),
            Err(IndexError::TableTooLarge { weight: 15, .. })
        ));
        assert!(CollapsedSeedIndex::check_weight(MAX_INDEX_WEIGHT).is_ok());
    }
}
