//! End-to-end mapping pipeline
//!
//! Reads are loaded and indexed, the genome is scanned into a spool file and
//! the spool is filtered into the final output.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::builder::{BuildError, IndexBuilder};
use crate::collator::CollatorParams;
use crate::filter::{FilterError, OutputFilter};
use crate::genome::{FastaGenomeSource, GenomeError, GenomeSource};
use crate::ignore::{IgnoreError, IgnoreList};
use crate::index::{CollapsedSeedIndex, IndexStats};
use crate::mask::{MaskError, SamplingMask};
use crate::params::{MapParams, ParamsError};
use crate::reads::{ReadError, ReadSource, ReadStore};
use crate::record::TabWriter;
use crate::scan::{HorizontalScanner, ScanError};
use crate::types::{ScanStats, SequenceInfo};

#[derive(Debug, Error)]
pub enum MapError {
    #[error("Parameter error: {0}")]
    Params(#[from] ParamsError),

    #[error("Mask error: {0}")]
    Mask(#[from] MaskError),

    #[error("Ignore list error: {0}")]
    Ignore(#[from] IgnoreError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Genome error: {0}")]
    Genome(#[from] GenomeError),

    #[error("Index build error: {0}")]
    Build(#[from] BuildError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type MapResult<T> = Result<T, MapError>;

/// Outcome of one mapping run
#[derive(Debug, Clone, Serialize)]
pub struct MappingSummary {
    pub reads: usize,
    pub max_read_length: usize,
    pub number_of_diagonals: usize,
    pub word_offset: usize,
    pub index: IndexStats,
    pub scan: ScanStats,
    /// Lines that survived the output filter
    pub mappings_reported: u64,
    /// Reads with at least one reported mapping
    pub reads_mapped: usize,
}

/// Final output, optionally gzip-compressed
pub enum OutputWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputWriter {
    pub fn create<P: AsRef<Path>>(path: P, gzip: bool) -> io::Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        Ok(if gzip {
            OutputWriter::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            OutputWriter::Plain(file)
        })
    }

    /// Flush buffers and write the gzip trailer
    pub fn finish(self) -> io::Result<()> {
        match self {
            OutputWriter::Plain(mut w) => w.flush(),
            OutputWriter::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputWriter::Plain(w) => w.write(buf),
            OutputWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputWriter::Plain(w) => w.flush(),
            OutputWriter::Gzip(w) => w.flush(),
        }
    }
}

/// Runs the whole pipeline for one parameter set
pub struct Mapper {
    params: MapParams,
    mask: SamplingMask,
    ignore: Option<IgnoreList>,
}

impl Mapper {
    /// Validate parameters, parse the mask and load the ignore list
    pub fn new(params: MapParams) -> MapResult<Self> {
        params.validate()?;
        let mask = SamplingMask::parse(&params.pattern)?;
        CollapsedSeedIndex::check_weight(mask.weight()).map_err(BuildError::from)?;
        let ignore = match &params.ignore_list {
            Some(path) => {
                let list = IgnoreList::load(path)?;
                list.check_weight(mask.weight())?;
                Some(list)
            }
            None => None,
        };
        info!(
            "Mask {} (weight {}, span {}), sensitivity {}",
            mask.pattern(),
            mask.weight(),
            mask.length(),
            params.sensitivity
        );
        Ok(Self { params, mask, ignore })
    }

    /// Map reads from disk against a genome on disk into `output`
    pub fn run<P, Q, O>(&self, reads: P, genome: Q, output: O) -> MapResult<MappingSummary>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        O: AsRef<Path>,
    {
        let output = output.as_ref();
        let reads = ReadStore::load(reads, !self.params.bisulfite)?;
        let mut genome = FastaGenomeSource::open(genome)?;

        let spool_dir = output
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let spool = tempfile::tempfile_in(&spool_dir)?;

        let mut writer = OutputWriter::create(output, self.params.gzip)?;
        let summary = self.map_with_spool(&reads, &mut genome, spool, &mut writer)?;
        writer.finish()?;
        info!("Wrote {} mappings to {}", summary.mappings_reported, output.display());
        Ok(summary)
    }

    /// Map in-memory or streamed inputs, spooling to an anonymous temp file
    pub fn map<R, G, W>(&self, reads: &R, genome: &mut G, output: W) -> MapResult<MappingSummary>
    where
        R: ReadSource + Sync,
        G: GenomeSource + ?Sized,
        W: Write,
    {
        let spool = tempfile::tempfile()?;
        self.map_with_spool(reads, genome, spool, output)
    }

    fn map_with_spool<R, G, W>(&self, reads: &R, genome: &mut G, spool: File, output: W) -> MapResult<MappingSummary>
    where
        R: ReadSource + Sync,
        G: GenomeSource + ?Sized,
        W: Write,
    {
        let built = IndexBuilder::new(&self.mask, &self.params, self.ignore.as_ref()).build(reads)?;

        let mut infos: Vec<SequenceInfo> = (0..reads.sequence_count())
            .map(|id| SequenceInfo::new(reads.forward_sequence(id).len()))
            .collect();

        let collator_params = CollatorParams::new(&self.params, &built);
        let mut scanner = HorizontalScanner::new(&self.mask, &built.index, self.ignore.as_ref(), collator_params)?;
        let mut spool_writer = TabWriter::new(BufWriter::new(spool));
        let stats = scanner.scan(genome, reads, &mut infos, &mut spool_writer)?;
        spool_writer.flush()?;

        let spool = spool_writer
            .into_inner()
            .into_inner()
            .map_err(|e| MapError::Io(e.into_error()))?;
        let mut spool = BufReader::new(spool);
        let mappings_reported = OutputFilter::new(&mut infos, &self.params).run(&mut spool, output)?;
        let reads_mapped = infos
            .iter()
            .filter(|info| {
                info.passing_mappings > 0 && info.passing_mappings <= self.params.max_mappings
            })
            .count();

        Ok(MappingSummary {
            reads: reads.sequence_count(),
            max_read_length: built.max_read_length,
            number_of_diagonals: built.number_of_diagonals,
            word_offset: built.word_offset,
            index: built.index.stats(),
            scan: stats,
            mappings_reported,
            reads_mapped,
        })
    }
}
