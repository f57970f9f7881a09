//! Match stream collation
//!
//! For one horizontal window every sampled key opens a stream over its
//! postings. The streams are merged through a min-heap so that all hits of a
//! read arrive together, ordered by read offset. Each group of hits is
//! chained along diagonals, the best chains are screened with a cheap
//! gap-free skeleton comparison and the survivors are aligned.

use log::{error, trace};
use thiserror::Error;

use crate::align::{bases_match, AlignError, BandedAligner};
use crate::builder::BuiltIndex;
use crate::index::CollapsedSeedIndex;
use crate::mask::SamplingMask;
use crate::params::MapParams;
use crate::reads::ReadSource;
use crate::record::{MappingRecord, RecordSink};
use crate::types::{OffsetPair, Posting, ScanStats, SeedKey, SequenceInfo, StrandedId};
use crate::variants::call_variants;

/// Score per newly covered base when extending a chain
pub const MATCH_GAIN: i32 = 2;
pub const GAP_OPEN: i32 = -3;
pub const GAP_EXTEND: i32 = -3;
/// Chains scoring below this are never aligned
pub const MIN_ANCHORING_SCORE: i32 = 10;
/// Extra diagonals on either side of a chain
pub const DEFAULT_BAND: i64 = 1;
/// Bands at least this wide are rejected
pub const MAX_BAND: i64 = 20;
/// Slack on the offset filter applied while advancing streams
pub const STREAM_SLACK: u32 = 10;
/// Groups with at least `diagonals / word_offset * REPEAT_FACTOR` hits are repeats
pub const REPEAT_FACTOR: usize = 5;

#[derive(Debug, Error)]
pub enum CollateError {
    #[error("Alignment error: {0}")]
    Align(#[from] AlignError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read {read} has no reverse complement")]
    MissingReverseComplement { read: usize },
}

pub type CollateResult<T> = Result<T, CollateError>;

/// Heap ordering key: read first, then offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamKey {
    pub sequence: StrandedId,
    pub offsets: OffsetPair,
}

/// Postings of one key seen from one horizontal offset
#[derive(Debug, Clone)]
pub struct MatchStream<'a> {
    postings: &'a [Posting],
    next: usize,
    horizontal: u16,
    key: StreamKey,
}

impl<'a> MatchStream<'a> {
    /// Open a stream; the first posting is taken without filtering
    pub fn open(postings: &'a [Posting], horizontal: u16) -> Option<Self> {
        let first = postings.first()?;
        Some(Self {
            postings,
            next: 1,
            horizontal,
            key: StreamKey {
                sequence: first.sequence,
                offsets: OffsetPair::new(first.offset, horizontal),
            },
        })
    }

    pub fn key(&self) -> StreamKey {
        self.key
    }

    /// Move to the next posting within `limit`; false once exhausted
    pub fn advance(&mut self, limit: u32) -> bool {
        let h = self.horizontal as u32;
        while let Some(posting) = self.postings.get(self.next) {
            self.next += 1;
            let v = posting.offset as u32;
            if h > v + limit || v > limit {
                continue;
            }
            self.key = StreamKey {
                sequence: posting.sequence,
                offsets: OffsetPair::new(posting.offset, self.horizontal),
            };
            return true;
        }
        false
    }
}

/// Binary min-heap of streams, 1-indexed: node `n` lives at `streams[n - 1]`
#[derive(Debug, Default)]
pub struct MatchStreamHeap<'a> {
    streams: Vec<MatchStream<'a>>,
}

impl<'a> MatchStreamHeap<'a> {
    pub fn new() -> Self {
        Self { streams: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn clear(&mut self) {
        self.streams.clear();
    }

    fn key(&self, node: usize) -> StreamKey {
        self.streams[node - 1].key
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.streams.swap(a - 1, b - 1);
    }

    pub fn push(&mut self, stream: MatchStream<'a>) {
        self.streams.push(stream);
        self.sift_up(self.streams.len());
    }

    pub fn peek_key(&self) -> Option<StreamKey> {
        self.streams.first().map(MatchStream::key)
    }

    /// Advance the minimum stream and restore heap order; an exhausted
    /// stream is removed
    pub fn advance_top(&mut self, limit: u32) {
        let Some(top) = self.streams.first_mut() else {
            return;
        };
        if !top.advance(limit) {
            self.streams.swap_remove(0);
        }
        if !self.streams.is_empty() {
            self.sift_down(1);
        }
    }

    fn sift_up(&mut self, mut node: usize) {
        while node > 1 {
            let parent = node / 2;
            if self.key(node) >= self.key(parent) {
                break;
            }
            self.swap(node, parent);
            node = parent;
        }
    }

    fn sift_down(&mut self, mut node: usize) {
        let n = self.streams.len();
        loop {
            let left = node * 2;
            if left > n {
                break;
            }
            let right = left + 1;
            let child = if right <= n && self.key(right) < self.key(left) {
                right
            } else {
                left
            };
            if self.key(child) >= self.key(node) {
                break;
            }
            self.swap(node, child);
            node = child;
        }
    }
}

/// A seed hit of one read, linked into a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPair {
    pub offsets: OffsetPair,
    /// Preceding pair of the chain
    pub previous: Option<usize>,
    pub best_score: i32,
}

impl MatchPair {
    pub fn new(offsets: OffsetPair) -> Self {
        Self {
            offsets,
            previous: None,
            best_score: 0,
        }
    }

    pub fn vertical(&self) -> usize {
        self.offsets.vertical as usize
    }

    pub fn horizontal(&self) -> usize {
        self.offsets.horizontal as usize
    }

    pub fn diagonal(&self) -> i32 {
        self.offsets.diagonal()
    }
}

/// Latest pair of a chain and the chain's score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRun {
    pub start: usize,
    pub score: i32,
}

/// Chain `pairs` (in heap order) into runs.
///
/// Each pair extends the best-scoring compatible chain or starts a new one.
/// `runs` receives one entry per chain, pointing at its latest pair.
pub fn chain_pairs(pairs: &mut [MatchPair], mask: &SamplingMask, runs: &mut Vec<MatchRun>) {
    runs.clear();
    let span = mask.length();
    let base_score = mask.weight() as i32 * MATCH_GAIN;

    for current in 0..pairs.len() {
        let cur = pairs[current];
        let mut best_score = 0;
        let mut best_pair = None;
        let mut best_run = 0;

        for (run_index, run) in runs.iter().enumerate() {
            let mut candidate = Some(run.start);
            while let Some(prev_index) = candidate {
                let prev = &pairs[prev_index];
                let score = if prev.diagonal() == cur.diagonal() {
                    let gap = cur.vertical().saturating_sub(prev.vertical());
                    prev.best_score + mask.contribution(gap) as i32 * MATCH_GAIN
                } else if prev.vertical() + span <= cur.vertical() {
                    let shift = (prev.diagonal() - cur.diagonal()).abs();
                    prev.best_score + (shift - 1) * GAP_EXTEND + GAP_OPEN + base_score
                } else {
                    candidate = prev.previous;
                    continue;
                };
                if score > best_score {
                    best_score = score;
                    best_pair = Some(prev_index);
                    best_run = run_index;
                }
                break;
            }
        }

        if best_score > base_score {
            pairs[current].best_score = best_score;
            pairs[current].previous = best_pair;
            if best_pair == Some(runs[best_run].start) {
                runs[best_run] = MatchRun {
                    start: current,
                    score: best_score,
                };
            } else {
                runs.push(MatchRun {
                    start: current,
                    score: best_score,
                });
            }
        } else {
            pairs[current].best_score = base_score;
            pairs[current].previous = None;
            runs.push(MatchRun {
                start: current,
                score: base_score,
            });
        }
    }
}

/// Thresholds shared by every window of a scan
#[derive(Debug, Clone, PartialEq)]
pub struct CollatorParams {
    pub number_of_diagonals: usize,
    pub word_offset: usize,
    pub max_mappings: u32,
    pub top_percent: f64,
    pub bisulfite: bool,
}

impl CollatorParams {
    pub fn new(params: &MapParams, built: &BuiltIndex) -> Self {
        Self {
            number_of_diagonals: built.number_of_diagonals,
            word_offset: built.word_offset.max(1),
            max_mappings: params.max_mappings,
            top_percent: params.top_percent,
            bisulfite: params.bisulfite,
        }
    }

    /// Offset limit applied while advancing streams
    pub fn stream_limit(&self) -> u32 {
        self.number_of_diagonals as u32 + STREAM_SLACK
    }

    /// Hit groups this large are treated as repeats
    pub fn repeat_cutoff(&self) -> usize {
        self.number_of_diagonals / self.word_offset * REPEAT_FACTOR
    }

    pub fn score_target(&self, best: i32) -> f64 {
        best as f64 * (1.0 - self.top_percent)
    }
}

/// The genome window currently being collated
#[derive(Debug, Clone, Copy)]
pub struct WindowContext<'w> {
    pub chrom_index: usize,
    /// Name written to the output
    pub chrom_name: &'w str,
    pub chrom_length: usize,
    /// The window lies on a `#RC.pash.` reverse strand
    pub reverse_chromosome: bool,
    /// Genome position of horizontal offset 0
    pub chunk_start: i64,
    /// Genome position of `template[0]`; may be negative
    pub template_start: i64,
    /// Padded bases around the chunk
    pub template: &'w [u8],
}

/// Counts of a gap-free comparison of a chain against the genome
fn skeleton_counts(
    pairs: &[MatchPair],
    run_start: usize,
    read: &[u8],
    window: &WindowContext<'_>,
    span: usize,
    bisulfite: bool,
) -> (i32, i32) {
    let mut matches = 0;
    let mut mismatches = 0;
    let mut next_block = Some(run_start);

    while let Some(stop_index) = next_block {
        let stop = pairs[stop_index];
        let mut first = stop;
        let mut previous = stop.previous;
        while let Some(index) = previous {
            let pair = pairs[index];
            if pair.diagonal() != stop.diagonal() {
                break;
            }
            first = pair;
            previous = pair.previous;
        }
        next_block = previous;

        let genome_start = window.chunk_start + first.horizontal() as i64 - window.template_start;
        let v_stop = stop.vertical() + span - 1;
        for (i, v) in (first.vertical()..=v_stop).enumerate() {
            let genome = usize::try_from(genome_start + i as i64)
                .ok()
                .and_then(|g| window.template.get(g));
            match (read.get(v), genome) {
                (Some(&r), Some(&g)) if bases_match(r, g, bisulfite) => matches += 1,
                _ => mismatches += 1,
            }
        }
    }
    (matches, mismatches)
}

/// Merges match streams for one window at a time and aligns the best chains
pub struct MatchStreamCollator<'a> {
    mask: &'a SamplingMask,
    index: &'a CollapsedSeedIndex,
    params: CollatorParams,
    heap: MatchStreamHeap<'a>,
    pairs: Vec<MatchPair>,
    runs: Vec<MatchRun>,
    aligner: BandedAligner,
}

impl<'a> MatchStreamCollator<'a> {
    pub fn new(mask: &'a SamplingMask, index: &'a CollapsedSeedIndex, params: CollatorParams) -> Self {
        let aligner = BandedAligner::new(params.bisulfite);
        Self {
            mask,
            index,
            params,
            heap: MatchStreamHeap::new(),
            pairs: Vec::new(),
            runs: Vec::new(),
            aligner,
        }
    }

    /// Open a stream for `key` seen at horizontal offset `horizontal`.
    ///
    /// Returns false when the key has no postings.
    pub fn add_stream(&mut self, key: SeedKey, horizontal: u16) -> bool {
        let Some(stream) = self
            .index
            .postings(key)
            .and_then(|postings| MatchStream::open(postings, horizontal))
        else {
            return false;
        };
        self.heap.push(stream);
        true
    }

    pub fn stream_count(&self) -> usize {
        self.heap.len()
    }

    /// Drain every open stream, aligning the best chains of each read.
    ///
    /// Accepted alignments are written to `sink`; per-read state lives in
    /// `infos`, indexed by read.
    pub fn collate<R, S>(
        &mut self,
        window: &WindowContext<'_>,
        reads: &R,
        infos: &mut [SequenceInfo],
        stats: &mut ScanStats,
        sink: &mut S,
    ) -> CollateResult<()>
    where
        R: ReadSource + ?Sized,
        S: RecordSink + ?Sized,
    {
        let limit = self.params.stream_limit();
        let cutoff = self.params.repeat_cutoff();

        while let Some(first) = self.heap.peek_key() {
            let sequence = first.sequence;
            self.pairs.clear();
            self.pairs.push(MatchPair::new(first.offsets));
            self.heap.advance_top(limit);

            while let Some(key) = self.heap.peek_key() {
                if key.sequence != sequence {
                    break;
                }
                if key.offsets.diagonal() >= 0 {
                    self.pairs.push(MatchPair::new(key.offsets));
                }
                self.heap.advance_top(limit);
            }

            if self.pairs.len() == 1 || self.pairs.len() >= cutoff {
                continue;
            }
            stats.ksw_calls += 1;
            chain_pairs(&mut self.pairs, self.mask, &mut self.runs);
            self.align_best_runs(sequence, window, reads, infos, stats, sink)?;
        }
        Ok(())
    }

    fn align_best_runs<R, S>(
        &mut self,
        sequence: StrandedId,
        window: &WindowContext<'_>,
        reads: &R,
        infos: &mut [SequenceInfo],
        stats: &mut ScanStats,
        sink: &mut S,
    ) -> CollateResult<()>
    where
        R: ReadSource + ?Sized,
        S: RecordSink + ?Sized,
    {
        let best = self.runs.iter().map(|run| run.score).max().unwrap_or(0);
        if best < MIN_ANCHORING_SCORE {
            return Ok(());
        }

        let read_id = sequence.read as usize;
        let Some(info) = infos.get_mut(read_id) else {
            return Ok(());
        };
        if best < info.best_anchoring_score * 3 / 4 {
            trace!("{}: anchoring {} below best {}", sequence, best, info.best_anchoring_score);
            return Ok(());
        }
        info.best_anchoring_score = info.best_anchoring_score.max(best);

        let read_length = info.length as i32;
        if info.best_sw_score >= read_length && info.best_score_mappings > self.params.max_mappings {
            return Ok(());
        }

        let template = if self.params.bisulfite {
            reads.forward_sequence(read_id)
        } else {
            reads
                .template(sequence)
                .ok_or(CollateError::MissingReverseComplement { read: read_id })?
        };

        let span = self.mask.length();
        let base = window.chunk_start;

        for run in self.runs.iter().filter(|run| run.score == best) {
            let stop = self.pairs[run.start];
            let mut first = run.start;
            while let Some(previous) = self.pairs[first].previous {
                first = previous;
            }
            if first == run.start {
                continue;
            }
            let start = self.pairs[first];

            let (v_start, h_start) = (start.vertical() as i64, start.horizontal() as i64);
            let (v_stop, h_stop) = (stop.vertical() as i64, stop.horizontal() as i64);
            let (window_start, band) = if start.diagonal() != stop.diagonal() {
                let mut lo = base + h_start - v_start;
                let mut hi = base + h_stop - v_stop;
                if hi < lo {
                    std::mem::swap(&mut lo, &mut hi);
                }
                lo -= DEFAULT_BAND;
                hi += DEFAULT_BAND;
                (lo, hi - lo + 2 * DEFAULT_BAND + 1)
            } else {
                (base + h_start - v_start - DEFAULT_BAND, 2 * DEFAULT_BAND + 1)
            };
            if band >= MAX_BAND {
                trace!("{}: band {} too wide", sequence, band);
                continue;
            }
            if window_start < window.template_start {
                trace!("{}: chain starts before the template", sequence);
                continue;
            }

            let (matches, mismatches) =
                skeleton_counts(&self.pairs, run.start, template, window, span, self.params.bisulfite);
            if mismatches * 4 > matches {
                stats.really_poor_anchorings += 1;
                trace!("{}: poor anchoring ({} matches, {} mismatches)", sequence, matches, mismatches);
                continue;
            }
            let skeleton = matches - 3 * mismatches;
            if skeleton < info.best_skeleton_score * 7 / 10 {
                stats.skeleton_rejects += 1;
                trace!("{}: skeleton {} below best {}", sequence, skeleton, info.best_skeleton_score);
                continue;
            }

            stats.sw_calls += 1;
            stats.failed_sw_calls += 1;
            let target = self.params.score_target(info.best_sw_score);
            let offset = (window_start - window.template_start) as usize;
            let window_bases = window.template.get(offset..).unwrap_or(&[]);
            let outcome = self
                .aligner
                .align(template, window_bases, band as usize, target)
                .map_err(|e| {
                    error!("Alignment of read {} on {} failed", sequence, window.chrom_name);
                    e
                })?;

            let summary = match outcome.summary {
                Some(summary) if outcome.score as f64 >= target => summary,
                _ => {
                    if skeleton < info.best_skeleton_score * 9 / 10 {
                        stats.predicted_skeleton_rejects += 1;
                    }
                    continue;
                }
            };
            let score = outcome.score;

            stats.failed_sw_calls -= 1;
            info.best_skeleton_score = info.best_skeleton_score.max(skeleton);
            if score > info.best_sw_score {
                info.best_chrom = Some(window.chrom_index);
                info.best_start = base + h_stop + span as i64;
                info.best_sw_score = score;
                info.best_score_mappings = 1;
            } else if score == info.best_sw_score {
                let same_chrom = info.best_chrom == Some(window.chrom_index);
                if !same_chrom || info.best_start + (read_length as i64) < base + h_start + 1 {
                    info.best_chrom = Some(window.chrom_index);
                    info.best_start = base + h_stop + span as i64;
                    info.best_score_mappings += 1;
                } else {
                    trace!("{}: duplicate mapping at {}", sequence, base + h_start);
                    continue;
                }
            }

            if score >= span as i32 {
                let calls = call_variants(template, window_bases, &summary, self.params.bisulfite);
                let record = MappingRecord {
                    read_id,
                    score,
                    read_length: template.len(),
                    read_name: reads.def_name(read_id).to_string(),
                    chrom_name: window.chrom_name.to_string(),
                    chrom_length: window.chrom_length,
                    strand: sequence.strand,
                    window_start,
                    summary,
                    calls,
                    quality: reads.quality(read_id).map(<[u8]>::to_vec),
                    bisulfite: self.params.bisulfite,
                    reverse_chromosome: window.reverse_chromosome,
                };
                sink.write_record(&record)?;
                stats.mappings_written += 1;
            }
        }
        Ok(())
    }
}
