//! Mapping parameters

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bisulfite::DEFAULT_MAX_VARIANTS;
use crate::mask::DEFAULT_MASK_NAME;

/// Lowest accepted keep percentage
pub const MIN_KEEP_PERCENT: u32 = 90;
/// Keep percentage used when nothing is configured
pub const DEFAULT_KEEP_PERCENT: u32 = 99;
/// Keep percentage forced by [`Sensitivity::Fast`]
pub const FAST_KEEP_PERCENT: u32 = 93;
/// Word offset used by [`Sensitivity::UserDefined`] when none is given
pub const DEFAULT_WORD_OFFSET: usize = 6;

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Unknown sensitivity '{0}' (expected high, medium, low, fast or user)")]
    UnknownSensitivity(String),
}

pub type ParamsResult<T> = Result<T, ParamsError>;

/// Trade-off between seeding density and speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    High,
    #[default]
    Medium,
    Low,
    Fast,
    /// Use the configured word offset for every read length
    #[serde(rename = "user")]
    UserDefined,
}

impl Sensitivity {
    /// Step between seeded read offsets for a read of `read_len` bases
    pub fn word_offset(self, read_len: usize, user_offset: usize) -> usize {
        let l = read_len;
        match self {
            Sensitivity::High => {
                if l <= 50 {
                    if l <= 36 { 2 } else { 3 }
                } else if l < 76 {
                    4
                } else {
                    6
                }
            }
            Sensitivity::Medium => {
                if l < 76 {
                    if l <= 36 { 2 } else if l <= 50 { 3 } else { 4 }
                } else if l < 100 {
                    8
                } else {
                    12
                }
            }
            Sensitivity::Low => {
                if l < 76 {
                    if l <= 36 { 2 } else { 4 }
                } else if l < 100 {
                    10
                } else if l < 150 {
                    14
                } else {
                    18
                }
            }
            Sensitivity::Fast => {
                if l <= 100 {
                    if l <= 36 { 2 } else if l <= 50 { 3 } else { 4 }
                } else if l <= 200 {
                    8
                } else {
                    10
                }
            }
            Sensitivity::UserDefined => user_offset,
        }
    }
}

impl FromStr for Sensitivity {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Sensitivity::High),
            "medium" => Ok(Sensitivity::Medium),
            "low" => Ok(Sensitivity::Low),
            "fast" => Ok(Sensitivity::Fast),
            "user" | "userdefined" => Ok(Sensitivity::UserDefined),
            other => Err(ParamsError::UnknownSensitivity(other.to_string())),
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensitivity::High => "high",
            Sensitivity::Medium => "medium",
            Sensitivity::Low => "low",
            Sensitivity::Fast => "fast",
            Sensitivity::UserDefined => "user",
        };
        f.write_str(name)
    }
}

/// Parameters for one mapping run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapParams {
    /// Preset name (`12from18`) or literal `0/1` mask
    pub pattern: String,
    pub sensitivity: Sensitivity,
    /// Seed step for [`Sensitivity::UserDefined`]
    pub word_offset: usize,
    /// Fraction below a read's best score still reported (0.01 = 1%)
    pub top_percent: f64,
    /// Maximum reported mappings per read
    pub max_mappings: u32,
    /// Percentage of seed occurrences kept by index pruning (90 to 100)
    pub keep_percent: u32,
    /// Map bisulfite-treated reads
    pub bisulfite: bool,
    /// Cap on C/T variants generated per bisulfite seed
    pub max_bisulfite_variants: usize,
    /// Gzip-compress the final output
    pub gzip: bool,
    /// Optional seed ignore list
    pub ignore_list: Option<PathBuf>,
}

impl Default for MapParams {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_MASK_NAME.to_string(),
            sensitivity: Sensitivity::Medium,
            word_offset: DEFAULT_WORD_OFFSET,
            top_percent: 0.01,
            max_mappings: 1,
            keep_percent: DEFAULT_KEEP_PERCENT,
            bisulfite: false,
            max_bisulfite_variants: DEFAULT_MAX_VARIANTS,
            gzip: false,
            ignore_list: None,
        }
    }
}

impl MapParams {
    /// Set the sensitivity; `Fast` also lowers the keep percentage
    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        if sensitivity == Sensitivity::Fast {
            self.keep_percent = FAST_KEEP_PERCENT;
        }
        self
    }

    /// Clamp a keep percentage into the accepted range
    pub fn clamp_keep_percent(keep_percent: u32) -> u32 {
        keep_percent.clamp(MIN_KEEP_PERCENT, 100)
    }

    /// Word offset for a read of `read_len` bases
    pub fn word_offset_for(&self, read_len: usize) -> usize {
        self.sensitivity.word_offset(read_len, self.word_offset)
    }

    /// Whether `score` is within the top fraction of `best`
    pub fn within_top(&self, score: i32, best: i32) -> bool {
        score as f64 >= self.score_target(best)
    }

    /// Lowest score still within the top fraction of `best`
    pub fn score_target(&self, best: i32) -> f64 {
        best as f64 * (1.0 - self.top_percent)
    }

    pub fn validate(&self) -> ParamsResult<()> {
        if !(0.0..1.0).contains(&self.top_percent) {
            return Err(ParamsError::InvalidParams(format!(
                "top percent must be in [0, 1), got {}",
                self.top_percent
            )));
        }
        if !(MIN_KEEP_PERCENT..=100).contains(&self.keep_percent) {
            return Err(ParamsError::InvalidParams(format!(
                "keep percent must be between {} and 100, got {}",
                MIN_KEEP_PERCENT, self.keep_percent
            )));
        }
        if self.word_offset == 0 {
            return Err(ParamsError::InvalidParams("word offset must be positive".to_string()));
        }
        if self.max_bisulfite_variants == 0 {
            return Err(ParamsError::InvalidParams(
                "max bisulfite variants must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
