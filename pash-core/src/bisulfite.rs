//! Bisulfite seed expansion
//!
//! After bisulfite treatment an unmethylated `C` reads as `T`, so a `T` in a
//! read seed may stand for either base on the genome. Each `T` position is
//! enumerated as `C` then `T`, leftmost position varying slowest.

use crate::key::encode_bases;
use crate::types::SeedKey;

/// Default cap on generated variants per k-mer
pub const DEFAULT_MAX_VARIANTS: usize = 512;

/// Enumerates C/T substitution variants of a sampled k-mer
#[derive(Debug, Clone)]
pub struct BisulfiteSeedExpander {
    max_variants: usize,
    ambiguous: Vec<usize>,
    scratch: Vec<u8>,
}

impl BisulfiteSeedExpander {
    pub fn new(max_variants: usize) -> Self {
        Self {
            max_variants,
            ambiguous: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Expand `kmer`, appending the keys to `out`.
    ///
    /// The all-`C` and all-`T` combinations are always emitted; the others
    /// only while fewer than `max_variants` keys have been produced, so at most
    /// `max_variants + 1` keys come out.
    pub fn expand_into(&mut self, kmer: &[u8], out: &mut Vec<SeedKey>) {
        self.ambiguous.clear();
        self.ambiguous
            .extend(kmer.iter().enumerate().filter(|(_, b)| **b == b'T').map(|(i, _)| i));
        self.scratch.clear();
        self.scratch.extend_from_slice(kmer);

        if self.ambiguous.is_empty() {
            out.push(encode_bases(self.scratch.iter().copied()));
            return;
        }

        let positions = self.ambiguous.len();
        let last: u64 = (1u64 << positions) - 1;
        let mut generated = 0usize;
        let mut combination: u64 = 0;
        loop {
            let all_c = combination == 0;
            let all_t = combination == last;
            if all_c || all_t || generated < self.max_variants {
                // bit (positions-1-i) drives ambiguous position i
                for (i, &pos) in self.ambiguous.iter().enumerate() {
                    let bit = (combination >> (positions - 1 - i)) & 1;
                    self.scratch[pos] = if bit == 0 { b'C' } else { b'T' };
                }
                out.push(encode_bases(self.scratch.iter().copied()));
                generated += 1;
            }
            if all_t {
                break;
            }
            combination = if generated >= self.max_variants {
                last
            } else {
                combination + 1
            };
        }
    }
}

impl Default for BisulfiteSeedExpander {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VARIANTS)
    }
}
