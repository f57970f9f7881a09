//! Spaced-seed sampling masks
//!
//! A mask selects `weight` positions out of a window of `length` bases. The
//! sampled bases form the seed key. The overlap table tells the collator how
//! many new bases a second hit on the same diagonal contributes.

use regex::Regex;
use thiserror::Error;

use crate::key::encode_bases;
use crate::types::{SeedKey, MAX_KEY_WEIGHT};

/// Longest literal pattern accepted
pub const MAX_MASK_LENGTH: usize = 50;

/// Preset used when nothing else is configured
pub const DEFAULT_MASK_NAME: &str = "12from18";

const DEFAULT_PATTERN: &str = "111010110100110111";

/// `(weight, length, pattern)` presets
const PRESETS: &[(usize, usize, &str)] = &[
    (8, 14, "11001001010111"),
    (9, 15, "110110101000111"),
    (10, 16, "1101100011010111"),
    (11, 18, "111010010100110111"),
    (12, 18, DEFAULT_PATTERN),
    (13, 21, "111011011000110101011"),
    (14, 21, "111011100101100101111"),
];

/// Errors that can occur while configuring a mask
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Mask weight and length are both unset")]
    MissingDimensions,

    #[error("Mask weight {weight} exceeds mask length {length}")]
    WeightExceedsLength { weight: usize, length: usize },

    #[error("Mask weight {weight} exceeds the maximum key weight of {max}", max = MAX_KEY_WEIGHT)]
    WeightTooLarge { weight: usize },

    #[error("No preset mask of weight {weight} and length {length}")]
    UnknownPreset { weight: usize, length: usize },

    #[error("Malformed mask pattern '{pattern}': {reason}")]
    MalformedPattern { pattern: String, reason: String },

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

pub type MaskResult<T> = Result<T, MaskError>;

/// A validated spaced-seed pattern with its overlap table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingMask {
    pattern: String,
    positions: Vec<usize>,
    overlap: Vec<u32>,
}

impl SamplingMask {
    /// Select a preset by weight and length
    pub fn from_weight_length(weight: usize, length: usize) -> MaskResult<Self> {
        if weight == 0 && length == 0 {
            return Err(MaskError::MissingDimensions);
        }
        if weight > length {
            return Err(MaskError::WeightExceedsLength { weight, length });
        }
        if weight > MAX_KEY_WEIGHT {
            return Err(MaskError::WeightTooLarge { weight });
        }
        PRESETS
            .iter()
            .find(|(w, l, _)| *w == weight && *l == length)
            .map(|(_, _, pattern)| Self::from_validated(pattern))
            .ok_or(MaskError::UnknownPreset { weight, length })
    }

    /// Build a mask from a literal `0`/`1` string
    pub fn from_literal(pattern: &str) -> MaskResult<Self> {
        let malformed = |reason: &str| MaskError::MalformedPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(malformed("pattern is empty"));
        }
        if pattern.len() > MAX_MASK_LENGTH {
            return Err(malformed(&format!("longer than {} positions", MAX_MASK_LENGTH)));
        }
        if let Some(c) = pattern.chars().find(|c| *c != '0' && *c != '1') {
            return Err(malformed(&format!("unexpected character '{}'", c)));
        }

        let weight = pattern.bytes().filter(|b| *b == b'1').count();
        if weight == 0 {
            return Err(malformed("no sampled positions"));
        }
        if weight > MAX_KEY_WEIGHT {
            return Err(MaskError::WeightTooLarge { weight });
        }
        Ok(Self::from_validated(pattern))
    }

    /// Parse either a preset name such as `12from18` or a literal pattern
    pub fn parse(name: &str) -> MaskResult<Self> {
        let preset = Regex::new(r"^(\d+)from(\d+)$")?;
        match preset.captures(name.trim()) {
            Some(caps) => {
                let number = |i: usize| -> MaskResult<usize> {
                    caps[i].parse().map_err(|_| MaskError::MalformedPattern {
                        pattern: name.to_string(),
                        reason: "number out of range".to_string(),
                    })
                };
                Self::from_weight_length(number(1)?, number(2)?)
            }
            None => Self::from_literal(name.trim()),
        }
    }

    fn from_validated(pattern: &str) -> Self {
        let bits: Vec<bool> = pattern.bytes().map(|b| b == b'1').collect();
        let positions: Vec<usize> = bits
            .iter()
            .enumerate()
            .filter_map(|(i, sampled)| sampled.then_some(i))
            .collect();
        let weight = positions.len() as u32;

        // overlap[g] = positions of the copy shifted by g not already sampled
        let mut overlap = Vec::with_capacity(bits.len());
        overlap.push(weight);
        for gap in 1..bits.len() {
            let fresh = positions
                .iter()
                .filter(|&&p| !bits.get(p + gap).copied().unwrap_or(false))
                .count();
            overlap.push(fresh as u32);
        }

        Self {
            pattern: pattern.to_string(),
            positions,
            overlap,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Sampled positions, in increasing order
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn weight(&self) -> usize {
        self.positions.len()
    }

    /// Window length (span) covered by the mask
    pub fn length(&self) -> usize {
        self.pattern.len()
    }

    /// Number of newly sampled bases when a second hit lies `gap` bases
    /// further along the same diagonal
    pub fn contribution(&self, gap: usize) -> u32 {
        self.overlap
            .get(gap)
            .copied()
            .unwrap_or(self.positions.len() as u32)
    }

    /// Sample the key of a window starting at `window[0]`.
    ///
    /// `window` must hold at least [`length`](Self::length) bases.
    pub fn sample(&self, window: &[u8]) -> SeedKey {
        encode_bases(self.positions.iter().map(|&p| window[p]))
    }

    /// Copy the sampled bases of a window into `out`
    pub fn sample_bases(&self, window: &[u8], out: &mut Vec<u8>) {
        out.clear();
        out.extend(self.positions.iter().map(|&p| window[p]));
    }
}

impl Default for SamplingMask {
    fn default() -> Self {
        Self::from_validated(DEFAULT_PATTERN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mask() {
        let mask = SamplingMask::default();
        assert_eq!(mask.weight(), 12);
        assert_eq!(mask.length(), 18);
        assert_eq!(mask, SamplingMask::parse(DEFAULT_MASK_NAME).unwrap());
    }

    #[test]
    fn test_all_presets_are_consistent() {
        for (weight, length, pattern) in PRESETS {
            let mask = SamplingMask::from_weight_length(*weight, *length).unwrap();
            assert_eq!(mask.weight(), *weight);
            assert_eq!(mask.length(), *length);
            assert_eq!(mask.pattern(), *pattern);
        }
    }

    #[test]
    fn test_overlap_contribution() {
        let mask = SamplingMask::from_literal("1101").unwrap();
        assert_eq!(mask.contribution(0), 3);
        // P = {0,1,3}; P+1 = {1,2,4}: new {2,4}
        assert_eq!(mask.contribution(1), 2);
        // P+2 = {2,3,5}: new {2,5}
        assert_eq!(mask.contribution(2), 2);
        // P+3 = {3,4,6}: new {4,6}
        assert_eq!(mask.contribution(3), 2);
        assert_eq!(mask.contribution(4), 3);
        assert_eq!(mask.contribution(100), 3);
    }

    #[test]
    fn test_solid_mask_overlap() {
        let mask = SamplingMask::from_literal("1111").unwrap();
        for gap in 1..4 {
            assert_eq!(mask.contribution(gap), gap as u32);
        }
    }

    #[test]
    fn test_configuration_errors() {
        assert!(matches!(
            SamplingMask::from_weight_length(0, 0),
            Err(MaskError::MissingDimensions)
        ));
        assert!(matches!(
            SamplingMask::from_weight_length(12, 10),
            Err(MaskError::WeightExceedsLength { .. })
        ));
        assert!(matches!(
            SamplingMask::from_weight_length(17, 30),
            Err(MaskError::WeightTooLarge { weight: 17 })
        ));
        assert!(matches!(
            SamplingMask::from_weight_length(12, 19),
            Err(MaskError::UnknownPreset { .. })
        ));
        assert!(matches!(
            SamplingMask::parse("1102"),
            Err(MaskError::MalformedPattern { .. })
        ));
        assert!(matches!(
            SamplingMask::parse("0000"),
            Err(MaskError::MalformedPattern { .. })
        ));
        assert!(matches!(
            SamplingMask::from_literal(&"1".repeat(17)),
            Err(MaskError::WeightTooLarge { .. })
        ));
        assert!(SamplingMask::from_literal(&"10".repeat(26)).is_err());
    }

    #[test]
    fn test_sample() {
        let mask = SamplingMask::from_literal("101").unwrap();
        assert_eq!(mask.sample(b"CAG"), crate::key::encode(b"CG"));
        let mut bases = Vec::new();
        mask.sample_bases(b"TTCA", &mut bases);
        assert_eq!(bases, b"TC");
    }
}
