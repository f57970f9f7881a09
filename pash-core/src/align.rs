//! Banded local alignment with traceback
//!
//! The read is aligned against a window in a band of `band` diagonals. Cell
//! `(i, j)` pairs read base `i` with window base `i + j - 1`. The full banded
//! matrix is kept so the best local alignment can be traced back into gap-free
//! blocks.

use log::error;
use thiserror::Error;

pub const MATCH_SCORE: i32 = 1;
pub const MISMATCH_SCORE: i32 = -2;
pub const GAP_SCORE: i32 = -3;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("Traceback failed at row {row}, column {column}\n  read:   {read}\n  window: {window}")]
    TracebackFailed {
        row: usize,
        column: usize,
        read: String,
        window: String,
    },
}

pub type AlignResult<T> = Result<T, AlignError>;

/// Whether a read base aligns to a genome base.
///
/// Under bisulfite conversion a read `T` may come from a genome `C`.
pub fn bases_match(read: u8, genome: u8, bisulfite: bool) -> bool {
    read == genome || (bisulfite && read == b'T' && genome == b'C')
}

/// A gap-free stretch of an alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedBlock {
    pub vertical_start: usize,
    pub horizontal_start: usize,
    pub size: usize,
}

/// Traceback of the best local alignment.
///
/// Coordinates are relative to the read and the window; `blocks` is stored
/// last block first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlignmentSummary {
    pub matches: u32,
    pub mismatches: u32,
    pub vertical_gaps: u32,
    pub horizontal_gaps: u32,
    pub gap_bases: u32,
    pub vertical_start: usize,
    pub vertical_stop: usize,
    pub horizontal_start: usize,
    pub horizontal_stop: usize,
    pub blocks: Vec<AlignedBlock>,
}

impl AlignmentSummary {
    pub fn gaps(&self) -> u32 {
        self.vertical_gaps + self.horizontal_gaps
    }
}

/// Best score and, when it reached the target, its traceback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentOutcome {
    pub score: i32,
    pub summary: Option<AlignmentSummary>,
}

/// Reusable banded Smith-Waterman aligner
#[derive(Debug, Clone, Default)]
pub struct BandedAligner {
    matrix: Vec<i32>,
    bisulfite: bool,
}

impl BandedAligner {
    pub fn new(bisulfite: bool) -> Self {
        Self {
            matrix: Vec::new(),
            bisulfite,
        }
    }

    fn matches(&self, read: u8, window: Option<&u8>) -> bool {
        window.is_some_and(|&genome| bases_match(read, genome, self.bisulfite))
    }

    /// Align `read` against `window` in a band of `band` diagonals.
    ///
    /// The traceback is only computed when the best score reaches `target`.
    pub fn align(&mut self, read: &[u8], window: &[u8], band: usize, target: f64) -> AlignResult<AlignmentOutcome> {
        let width = band + 2;
        let rows = read.len();
        self.matrix.clear();
        self.matrix.resize(width * (rows + 1), 0);

        let mut best = 0;
        let mut best_row = 0;
        let mut best_col = 0;
        for (i, &base) in read.iter().enumerate() {
            let prev = i * width;
            let cur = prev + width;
            for j in 1..=band {
                let left = self.matrix[cur + j - 1] + GAP_SCORE;
                let up = self.matrix[prev + j + 1] + GAP_SCORE;
                let diag = self.matrix[prev + j]
                    + if self.matches(base, window.get(i + j - 1)) {
                        MATCH_SCORE
                    } else {
                        MISMATCH_SCORE
                    };
                let score = diag.max(up).max(left);
                if score > 0 {
                    self.matrix[cur + j] = score;
                    if score > best {
                        best = score;
                        best_row = i;
                        best_col = j;
                    }
                } else {
                    self.matrix[cur + j] = 0;
                }
            }
            self.matrix[cur + band + 1] = 0;
        }

        if (best as f64) < target || best == 0 {
            return Ok(AlignmentOutcome { score: best, summary: None });
        }

        let summary = self.traceback(read, window, width, best_row, best_col)?;
        Ok(AlignmentOutcome {
            score: best,
            summary: Some(summary),
        })
    }

    fn traceback(
        &self,
        read: &[u8],
        window: &[u8],
        width: usize,
        mut row: usize,
        mut col: usize,
    ) -> AlignResult<AlignmentSummary> {
        let m = &self.matrix;
        let mut summary = AlignmentSummary {
            vertical_stop: row,
            horizontal_stop: row + col - 1,
            ..Default::default()
        };
        let mut block_stop = row;
        let mut in_gap = false;

        loop {
            let cur = (row + 1) * width;
            let prev = row * width;
            let value = m[cur + col];
            let matched = self.matches(read[row], window.get(row + col - 1));

            let diagonal = if m[prev + col] + MATCH_SCORE == value && matched {
                summary.matches += 1;
                true
            } else if m[prev + col] + MISMATCH_SCORE == value && !matched {
                summary.mismatches += 1;
                true
            } else {
                false
            };

            if diagonal {
                if m[prev + col] == 0 {
                    summary.blocks.push(AlignedBlock {
                        vertical_start: row,
                        horizontal_start: row + col - 1,
                        size: block_stop - row + 1,
                    });
                    summary.vertical_start = row;
                    summary.horizontal_start = row + col - 1;
                    return Ok(summary);
                }
                if in_gap {
                    in_gap = false;
                    block_stop = row;
                }
                row -= 1;
            } else if m[cur + col - 1] + GAP_SCORE == value {
                summary.gap_bases += 1;
                if !in_gap {
                    in_gap = true;
                    summary.horizontal_gaps += 1;
                    summary.blocks.push(AlignedBlock {
                        vertical_start: row + 1,
                        horizontal_start: row + col,
                        size: block_stop - row,
                    });
                }
                col -= 1;
            } else if row > 0 && m[prev + col + 1] + GAP_SCORE == value {
                summary.gap_bases += 1;
                if !in_gap {
                    in_gap = true;
                    summary.vertical_gaps += 1;
                    summary.blocks.push(AlignedBlock {
                        vertical_start: row + 1,
                        horizontal_start: row + col,
                        size: block_stop - row,
                    });
                }
                row -= 1;
                col += 1;
            } else {
                let err = AlignError::TracebackFailed {
                    row,
                    column: col,
                    read: String::from_utf8_lossy(read).into_owned(),
                    window: String::from_utf8_lossy(window).into_owned(),
                };
                error!("{}", err);
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_single_block() {
        let mut aligner = BandedAligner::new(false);
        let outcome = aligner.align(b"ACTG", b"ACTG", 2, 0.0).unwrap();
        assert_eq!(outcome.score, 4);
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.matches, 4);
        assert_eq!(summary.mismatches, 0);
        assert_eq!(summary.gaps(), 0);
        assert_eq!(
            summary.blocks,
            vec![AlignedBlock {
                vertical_start: 0,
                horizontal_start: 0,
                size: 4
            }]
        );
        assert_eq!((summary.vertical_start, summary.vertical_stop), (0, 3));
        assert_eq!((summary.horizontal_start, summary.horizontal_stop), (0, 3));
    }

    #[test]
    fn test_horizontal_gap() {
        let mut aligner = BandedAligner::new(false);
        let outcome = aligner
            .align(b"AAAACCCCGGGGTTTT", b"AAAACCCCTGGGGTTTT", 3, 0.0)
            .unwrap();
        assert_eq!(outcome.score, 13);
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.matches, 16);
        assert_eq!(summary.horizontal_gaps, 1);
        assert_eq!(summary.vertical_gaps, 0);
        assert_eq!(summary.gap_bases, 1);
        assert_eq!(
            summary.blocks,
            vec![
                AlignedBlock {
                    vertical_start: 8,
                    horizontal_start: 9,
                    size: 8
                },
                AlignedBlock {
                    vertical_start: 0,
                    horizontal_start: 0,
                    size: 8
                },
            ]
        );
        assert_eq!(summary.horizontal_stop, 16);
    }

    #[test]
    fn test_vertical_gap() {
        let mut aligner = BandedAligner::new(false);
        let outcome = aligner
            .align(b"AAAACCCCTGGGGTTTT", b"NAAAACCCCGGGGTTTT", 3, 0.0)
            .unwrap();
        assert_eq!(outcome.score, 13);
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.vertical_gaps, 1);
        assert_eq!(summary.horizontal_gaps, 0);
        assert_eq!(summary.gap_bases, 1);
        assert_eq!(
            summary.blocks,
            vec![
                AlignedBlock {
                    vertical_start: 9,
                    horizontal_start: 9,
                    size: 8
                },
                AlignedBlock {
                    vertical_start: 0,
                    horizontal_start: 1,
                    size: 8
                },
            ]
        );
        assert_eq!((summary.horizontal_start, summary.horizontal_stop), (1, 16));
    }

    #[test]
    fn test_bisulfite_conversion_scores_as_match() {
        let mut plain = BandedAligner::new(false);
        let mut bisulfite = BandedAligner::new(true);

        let converted = bisulfite.align(b"TTTT", b"CCCC", 1, 0.0).unwrap();
        assert_eq!(converted.score, 4);
        assert_eq!(converted.summary.unwrap().matches, 4);

        let unconverted = plain.align(b"TTTT", b"CCCC", 1, 0.0).unwrap();
        assert_eq!(unconverted.score, 0);
        assert!(unconverted.summary.is_none());

        // a genuine mismatch still costs in bisulfite mode
        let mismatch = bisulfite.align(b"AAAA", b"GGGG", 1, 0.0).unwrap();
        assert!(mismatch.score < converted.score);
    }

    #[test]
    fn test_below_target_has_no_summary() {
        let mut aligner = BandedAligner::new(false);
        let outcome = aligner.align(b"ACGT", b"ACGT", 1, 10.0).unwrap();
        assert_eq!(outcome.score, 4);
        assert!(outcome.summary.is_none());
    }

    #[test]
    fn test_window_shorter_than_band() {
        let mut aligner = BandedAligner::new(false);
        let outcome = aligner.align(b"ACGTACGT", b"ACG", 3, 0.0).unwrap();
        assert_eq!(outcome.score, 3);
        assert_eq!(outcome.summary.unwrap().blocks.len(), 1);
    }
}
