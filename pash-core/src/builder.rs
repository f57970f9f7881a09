//! Read seeding and index construction
//!
//! Every read is seeded twice: once to size the index bins and once to fill
//! them. Seed extraction runs in parallel over batches of reads; marking and
//! insertion are applied in read order so postings come out in the same order
//! on every run.

use log::{debug, info};
use rayon::prelude::*;
use thiserror::Error;

use crate::bisulfite::BisulfiteSeedExpander;
use crate::ignore::{IgnoreError, IgnoreList};
use crate::index::{CollapsedSeedIndex, IndexError};
use crate::key::{complement, encode_bases};
use crate::mask::SamplingMask;
use crate::params::{MapParams, Sensitivity};
use crate::reads::ReadSource;
use crate::types::{Posting, SeedKey, StrandedId};

/// Reads seeded per parallel batch
const SEED_BATCH_SIZE: usize = 4096;

/// Lower bound on the number of diagonals a window covers
pub const MIN_DIAGONALS: usize = 100;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Ignore list error: {0}")]
    Ignore(#[from] IgnoreError),

    #[error("Read {read} is {length} bases long; offsets are limited to {max}", max = u16::MAX)]
    ReadTooLong { read: usize, length: usize },
}

pub type BuildResult<T> = Result<T, BuildError>;

/// A seed key and where it occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    pub key: SeedKey,
    pub posting: Posting,
}

/// The filled index and the window geometry derived from the reads
#[derive(Debug)]
pub struct BuiltIndex {
    pub index: CollapsedSeedIndex,
    /// Diagonals covered by one scan window
    pub number_of_diagonals: usize,
    /// Word offset used for the repeat cutoff
    pub word_offset: usize,
    pub max_read_length: usize,
}

/// Seeds reads into a [`CollapsedSeedIndex`]
pub struct IndexBuilder<'a> {
    mask: &'a SamplingMask,
    params: &'a MapParams,
    ignore: Option<&'a IgnoreList>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(mask: &'a SamplingMask, params: &'a MapParams, ignore: Option<&'a IgnoreList>) -> Self {
        Self { mask, params, ignore }
    }

    fn is_ignored(&self, key: SeedKey) -> BuildResult<bool> {
        match self.ignore {
            Some(list) => Ok(list.is_ignored(key)?),
            None => Ok(false),
        }
    }

    /// Append the seeds of one read to `out`.
    ///
    /// Reverse-strand seeds are sampled from the forward bases directly;
    /// bisulfite reads are seeded on the forward strand only.
    pub fn seed_read(
        &self,
        read: u32,
        forward: &[u8],
        expander: &mut BisulfiteSeedExpander,
        out: &mut Vec<Seed>,
    ) -> BuildResult<()> {
        let len = forward.len();
        let span = self.mask.length();
        if len < span {
            return Ok(());
        }
        if len > u16::MAX as usize {
            return Err(BuildError::ReadTooLong {
                read: read as usize,
                length: len,
            });
        }
        let gap = self.params.word_offset_for(len).max(1);

        if self.params.bisulfite {
            let mut bases = Vec::with_capacity(self.mask.weight());
            let mut keys = Vec::new();
            for start in (0..=len - span).step_by(gap) {
                self.mask.sample_bases(&forward[start..], &mut bases);
                keys.clear();
                expander.expand_into(&bases, &mut keys);
                for &key in &keys {
                    if self.is_ignored(key)? {
                        continue;
                    }
                    out.push(Seed {
                        key,
                        posting: Posting {
                            sequence: StrandedId::forward(read),
                            offset: start as u16,
                        },
                    });
                }
            }
            return Ok(());
        }

        for start in (0..=len - span).step_by(gap) {
            let key = self.mask.sample(&forward[start..]);
            if !self.is_ignored(key)? {
                out.push(Seed {
                    key,
                    posting: Posting {
                        sequence: StrandedId::forward(read),
                        offset: start as u16,
                    },
                });
            }
        }

        // reverse strand: walk the forward read backwards, complementing
        let mut start = len - 1;
        loop {
            let key = encode_bases(
                self.mask
                    .positions()
                    .iter()
                    .map(|&p| complement(forward[start - p])),
            );
            if !self.is_ignored(key)? {
                out.push(Seed {
                    key,
                    posting: Posting {
                        sequence: StrandedId::reverse(read),
                        offset: (len - 1 - start) as u16,
                    },
                });
            }
            if start < span - 1 + gap {
                break;
            }
            start -= gap;
        }
        Ok(())
    }

    fn collect_seeds<R: ReadSource + Sync>(
        &self,
        reads: &R,
        batch: std::ops::Range<usize>,
    ) -> BuildResult<Vec<Vec<Seed>>> {
        batch
            .into_par_iter()
            .map_init(
                || BisulfiteSeedExpander::new(self.params.max_bisulfite_variants),
                |expander, id| -> BuildResult<Vec<Seed>> {
                    let mut seeds = Vec::new();
                    self.seed_read(id as u32, reads.forward_sequence(id), expander, &mut seeds)?;
                    Ok(seeds)
                },
            )
            .collect()
    }

    /// Size, allocate and fill an index from all reads
    pub fn build<R: ReadSource + Sync>(&self, reads: &R) -> BuildResult<BuiltIndex> {
        let mut index = CollapsedSeedIndex::new(self.mask.weight(), self.params.keep_percent)?;
        let count = reads.sequence_count();

        let mut seeds_marked = 0u64;
        for start in (0..count).step_by(SEED_BATCH_SIZE) {
            let batch = start..(start + SEED_BATCH_SIZE).min(count);
            for seeds in self.collect_seeds(reads, batch)? {
                for seed in seeds {
                    index.mark(seed.key)?;
                    seeds_marked += 1;
                }
            }
        }
        debug!("Sizing pass marked {} seeds", seeds_marked);

        index.allocate()?;

        for start in (0..count).step_by(SEED_BATCH_SIZE) {
            let batch = start..(start + SEED_BATCH_SIZE).min(count);
            for seeds in self.collect_seeds(reads, batch)? {
                for seed in seeds {
                    if index.is_present(seed.key) {
                        index.insert(seed.key, seed.posting)?;
                    }
                }
            }
        }

        let max_read_length = reads.max_length();
        let number_of_diagonals = max_read_length.max(MIN_DIAGONALS);
        let word_offset = match self.params.sensitivity {
            Sensitivity::UserDefined => self.params.word_offset,
            _ => self.params.word_offset_for(max_read_length),
        }
        .max(1);

        let stats = index.stats();
        info!(
            "Built seed index: {} keys present, {} pruned, {} postings (threshold {})",
            stats.keys_present, stats.keys_pruned, stats.postings, stats.threshold
        );
        info!(
            "Window covers {} diagonals, word offset {}",
            number_of_diagonals, word_offset
        );

        Ok(BuiltIndex {
            index,
            number_of_diagonals,
            word_offset,
            max_read_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::encode;
    use crate::reads::ReadStore;
    use crate::types::Strand;

    fn user_params(word_offset: usize) -> MapParams {
        MapParams {
            sensitivity: Sensitivity::UserDefined,
            word_offset,
            keep_percent: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_forward_and_reverse_seeds() {
        let mask = SamplingMask::from_literal("1111").unwrap();
        let params = user_params(2);
        let builder = IndexBuilder::new(&mask, &params, None);
        let mut expander = BisulfiteSeedExpander::default();
        let mut seeds = Vec::new();
        builder.seed_read(0, b"ACGTTG", &mut expander, &mut seeds).unwrap();

        let forward: Vec<_> = seeds
            .iter()
            .filter(|s| s.posting.sequence.strand == Strand::Forward)
            .map(|s| (s.key, s.posting.offset))
            .collect();
        assert_eq!(forward, vec![(encode(b"ACGT"), 0), (encode(b"GTTG"), 2)]);

        // reverse complement is CAACGT: seeds at offsets 0 and 2
        let reverse: Vec<_> = seeds
            .iter()
            .filter(|s| s.posting.sequence.strand == Strand::Reverse)
            .map(|s| (s.key, s.posting.offset))
            .collect();
        assert_eq!(reverse, vec![(encode(b"CAAC"), 0), (encode(b"ACGT"), 2)]);
    }

    #[test]
    fn test_short_reads_have_no_seeds() {
        let mask = SamplingMask::default();
        let params = MapParams::default();
        let builder = IndexBuilder::new(&mask, &params, None);
        let mut seeds = Vec::new();
        builder
            .seed_read(0, b"ACGT", &mut BisulfiteSeedExpander::default(), &mut seeds)
            .unwrap();
        assert!(seeds.is_empty());
    }

    #[test]
    fn test_ignored_keys_are_skipped() {
        let mask = SamplingMask::from_literal("11").unwrap();
        let params = user_params(1);
        let ignore = IgnoreList::from_keys(2, [encode(b"AC")]).unwrap();
        let builder = IndexBuilder::new(&mask, &params, Some(&ignore));
        let mut seeds = Vec::new();
        builder
            .seed_read(0, b"ACA", &mut BisulfiteSeedExpander::default(), &mut seeds)
            .unwrap();
        assert!(seeds.iter().all(|s| s.key != encode(b"AC")));
        assert!(seeds.iter().any(|s| s.key == encode(b"CA")));
    }

    #[test]
    fn test_bisulfite_seeds_forward_only() {
        let mask = SamplingMask::from_literal("11").unwrap();
        let params = MapParams {
            bisulfite: true,
            ..user_params(1)
        };
        let builder = IndexBuilder::new(&mask, &params, None);
        let mut seeds = Vec::new();
        builder
            .seed_read(3, b"TA", &mut BisulfiteSeedExpander::default(), &mut seeds)
            .unwrap();
        let keys: Vec<_> = seeds.iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![encode(b"CA"), encode(b"TA")]);
        assert!(seeds.iter().all(|s| s.posting.sequence == StrandedId::forward(3)));
    }

    #[test]
    fn test_build_matches_mark_counts() {
        let mask = SamplingMask::from_literal("1111").unwrap();
        let params = MapParams {
            keep_percent: 100,
            ..MapParams::default()
        };
        let mut reads = ReadStore::new(true);
        for _ in 0..3 {
            reads.push("r", b"AAAA", None);
        }
        let built = IndexBuilder::new(&mask, &params, None).build(&reads).unwrap();
        let postings = built.index.postings(encode(b"AAAA")).unwrap();
        assert_eq!(postings.len(), 3);
        assert!(postings.iter().all(|p| p.sequence.strand == Strand::Forward));
        let reverse = built.index.postings(encode(b"TTTT")).unwrap();
        assert_eq!(reverse.len(), 3);
        assert_eq!(built.number_of_diagonals, MIN_DIAGONALS);
        assert_eq!(built.max_read_length, 4);
    }
}
