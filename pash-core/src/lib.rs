//! Pash Core Library
//!
//! Seed indexing, match stream collation, banded alignment and output
//! filtering for the pash short-read mapper.

pub mod types;
pub mod key;
pub mod mask;
pub mod bisulfite;
pub mod index;
pub mod ignore;
pub mod reads;
pub mod genome;
pub mod params;
pub mod builder;
pub mod align;
pub mod variants;
pub mod record;
pub mod collator;
pub mod filter;
pub mod scan;
pub mod mapper;

// Re-export commonly used types and functions
pub use types::{OffsetPair, Posting, ScanStats, SeedKey, SequenceInfo, Strand, StrandedId, BAD_KEY};
pub use mask::SamplingMask;
pub use bisulfite::BisulfiteSeedExpander;
pub use index::{CollapsedSeedIndex, IndexStats};
pub use ignore::IgnoreList;
pub use reads::{ReadSource, ReadStore};
pub use genome::{ChunkCursor, ChunkWindow, FastaGenomeSource, GenomeSource, HorizontalSequence, MemoryGenomeSource};
pub use params::{MapParams, Sensitivity};
pub use builder::{BuiltIndex, IndexBuilder};
pub use align::{AlignmentOutcome, AlignmentSummary, BandedAligner};
pub use variants::{call_variants, VariantCalls};
pub use record::{MappingRecord, RecordSink, TabWriter};
pub use collator::{CollatorParams, MatchStreamCollator, WindowContext};
pub use filter::OutputFilter;
pub use scan::HorizontalScanner;
pub use mapper::{MapError, MapResult, Mapper, MappingSummary, OutputWriter};

/// Version information for the pash core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
