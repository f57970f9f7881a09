//! Horizontal (genome) scanning
//!
//! Each chromosome is cut into overlapping chunks of `2 * diagonals` bases
//! starting every `diagonals` bases, pulled from the genome source through a
//! [`ChunkCursor`]. Every offset of a chunk is sampled with the mask and the
//! resulting keys are collated against the read index.

use log::{debug, info};
use thiserror::Error;

use crate::collator::{CollateError, CollatorParams, MatchStreamCollator, WindowContext};
use crate::genome::{ChunkCursor, GenomeError, GenomeSource, HorizontalSequence};
use crate::ignore::{IgnoreError, IgnoreList};
use crate::index::CollapsedSeedIndex;
use crate::mask::SamplingMask;
use crate::reads::ReadSource;
use crate::record::RecordSink;
use crate::types::{ScanStats, SequenceInfo, BAD_KEY};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Window of {diagonals} diagonals with a span {span} mask does not fit 16-bit offsets")]
    WindowTooLarge { diagonals: usize, span: usize },

    #[error("Collation error: {0}")]
    Collate(#[from] CollateError),

    #[error("Ignore list error: {0}")]
    Ignore(#[from] IgnoreError),

    #[error("Genome error: {0}")]
    Genome(#[from] GenomeError),
}

pub type ScanResult<T> = Result<T, ScanError>;

/// Scans chromosomes against a read index
pub struct HorizontalScanner<'a> {
    mask: &'a SamplingMask,
    ignore: Option<&'a IgnoreList>,
    collator: MatchStreamCollator<'a>,
    cursor: ChunkCursor,
    bisulfite: bool,
}

impl<'a> HorizontalScanner<'a> {
    pub fn new(
        mask: &'a SamplingMask,
        index: &'a CollapsedSeedIndex,
        ignore: Option<&'a IgnoreList>,
        params: CollatorParams,
    ) -> ScanResult<Self> {
        let diagonals = params.number_of_diagonals;
        if 2 * diagonals + mask.length() > u16::MAX as usize + 1 {
            return Err(ScanError::WindowTooLarge {
                diagonals,
                span: mask.length(),
            });
        }
        let bisulfite = params.bisulfite;
        Ok(Self {
            mask,
            ignore,
            collator: MatchStreamCollator::new(mask, index, params),
            cursor: ChunkCursor::new(diagonals, diagonals + 1),
            bisulfite,
        })
    }

    /// Scan the chromosome `genome` has just announced as `chrom`
    pub fn scan_sequence<G, R, S>(
        &mut self,
        genome: &mut G,
        chrom: &HorizontalSequence,
        reads: &R,
        infos: &mut [SequenceInfo],
        stats: &mut ScanStats,
        sink: &mut S,
    ) -> ScanResult<()>
    where
        G: GenomeSource + ?Sized,
        R: ReadSource + ?Sized,
        S: RecordSink + ?Sized,
    {
        let (chrom_name, reverse_chromosome) = match chrom.reverse_strand_of() {
            Some(forward) if self.bisulfite => (forward, true),
            _ => (chrom.name.as_str(), false),
        };
        let span = self.mask.length();

        self.cursor.reset(chrom);
        while let Some(window) = self.cursor.next_chunk(genome)? {
            let bases = window.bases();
            if bases.len() >= span {
                for h in 0..=bases.len() - span {
                    let key = self.mask.sample(&bases[h..]);
                    if key == BAD_KEY {
                        continue;
                    }
                    if let Some(list) = self.ignore {
                        if list.is_ignored(key)? {
                            continue;
                        }
                    }
                    self.collator.add_stream(key, h as u16);
                }
            }
            if self.collator.stream_count() == 0 {
                continue;
            }

            let context = WindowContext {
                chrom_index: chrom.index,
                chrom_name,
                chrom_length: chrom.length,
                reverse_chromosome,
                chunk_start: window.start as i64,
                template_start: window.template_start,
                template: window.template,
            };
            self.collator.collate(&context, reads, infos, stats, sink)?;
        }
        debug!(
            "Scanned {} ({} bases) in {} chunks",
            chrom.name,
            chrom.length,
            self.cursor.chunk_count()
        );
        Ok(())
    }

    /// Scan every chromosome of `genome`, from the first one
    pub fn scan<G, R, S>(
        &mut self,
        genome: &mut G,
        reads: &R,
        infos: &mut [SequenceInfo],
        sink: &mut S,
    ) -> ScanResult<ScanStats>
    where
        G: GenomeSource + ?Sized,
        R: ReadSource + ?Sized,
        S: RecordSink + ?Sized,
    {
        genome.rewind()?;
        let mut stats = ScanStats::default();
        let mut chromosomes = 0;
        while let Some(chrom) = genome.next_sequence()? {
            self.scan_sequence(genome, &chrom, reads, infos, &mut stats, sink)?;
            chromosomes += 1;
        }
        info!("Scanned {} chromosomes", chromosomes);
        info!(
            "Chained groups {}, alignments {} ({} below threshold), poor anchorings {}, \
             skeleton rejects {} (predicted {}), mappings written {}",
            stats.ksw_calls,
            stats.sw_calls,
            stats.failed_sw_calls,
            stats.really_poor_anchorings,
            stats.skeleton_rejects,
            stats.predicted_skeleton_rejects,
            stats.mappings_written
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::MemoryGenomeSource;
    use crate::record::MappingRecord;
    use crate::reads::ReadStore;

    fn params(diagonals: usize) -> CollatorParams {
        CollatorParams {
            number_of_diagonals: diagonals,
            word_offset: 2,
            max_mappings: 1,
            top_percent: 0.01,
            bisulfite: false,
        }
    }

    #[test]
    fn test_window_too_large() {
        let mask = SamplingMask::default();
        let index = CollapsedSeedIndex::new(mask.weight(), 100).unwrap();
        assert!(matches!(
            HorizontalScanner::new(&mask, &index, None, params(40_000)),
            Err(ScanError::WindowTooLarge { .. })
        ));
        assert!(HorizontalScanner::new(&mask, &index, None, params(1000)).is_ok());
    }

    #[test]
    fn test_scan_empty_index_writes_nothing() {
        let mask = SamplingMask::from_literal("1111").unwrap();
        let mut index = CollapsedSeedIndex::new(4, 100).unwrap();
        index.allocate().unwrap();
        let mut scanner = HorizontalScanner::new(&mask, &index, None, params(100)).unwrap();
        let mut genome = MemoryGenomeSource::new().with_sequence("chr1", b"ACGTACGTACGT");
        let reads = ReadStore::new(true);
        let mut records: Vec<MappingRecord> = Vec::new();
        let stats = scanner.scan(&mut genome, &reads, &mut [], &mut records).unwrap();
        assert_eq!(stats, ScanStats::default());
        assert!(records.is_empty());
    }
}
