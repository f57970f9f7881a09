//! Read (vertical sequence) loading
//!
//! Reads are parsed from FASTA or FASTQ, plain or gzip-compressed, with
//! needletail. Bases are normalised to `ACGTN` and reverse complements are
//! precomputed when the reverse strand will be seeded.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use bio::alphabets::dna::revcomp;
use flate2::read::GzDecoder;
use log::info;
use needletail::{parse_fastx_file, parse_fastx_reader};
use thiserror::Error;

use crate::types::{Strand, StrandedId};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No reads found")]
    Empty,
}

pub type ReadResult<T> = Result<T, ReadError>;

/// Random access to a loaded read set
pub trait ReadSource {
    fn sequence_count(&self) -> usize;

    /// Forward bases of read `id`
    fn forward_sequence(&self, id: usize) -> &[u8];

    /// Reverse complement of read `id`, when it was computed at load time
    fn reverse_complement(&self, id: usize) -> Option<&[u8]>;

    /// Raw quality string of read `id`, if the input had qualities
    fn quality(&self, id: usize) -> Option<&[u8]>;

    /// Read name: the first word of its definition line
    fn def_name(&self, id: usize) -> &str;

    fn max_length(&self) -> usize {
        (0..self.sequence_count())
            .map(|id| self.forward_sequence(id).len())
            .max()
            .unwrap_or(0)
    }

    /// Bases to align for a stranded id
    fn template(&self, id: StrandedId) -> Option<&[u8]> {
        match id.strand {
            Strand::Forward => Some(self.forward_sequence(id.read as usize)),
            Strand::Reverse => self.reverse_complement(id.read as usize),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredRead {
    name: String,
    forward: Vec<u8>,
    reverse: Option<Vec<u8>>,
    quality: Option<Vec<u8>>,
}

/// In-memory read set
#[derive(Debug, Clone, Default)]
pub struct ReadStore {
    reads: Vec<StoredRead>,
    with_reverse: bool,
}

/// Uppercase and map anything outside `ACGT` to `N`
fn normalise(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .map(|b| match b.to_ascii_uppercase() {
            base @ (b'A' | b'C' | b'G' | b'T') => base,
            _ => b'N',
        })
        .collect()
}

fn first_word(id: &[u8]) -> String {
    let id = String::from_utf8_lossy(id);
    id.split_whitespace().next().unwrap_or("").to_string()
}

impl ReadStore {
    /// Empty store; `with_reverse` precomputes reverse complements on push
    pub fn new(with_reverse: bool) -> Self {
        Self {
            reads: Vec::new(),
            with_reverse,
        }
    }

    /// Load a FASTA/FASTQ file, gzip-compressed when the name ends in `.gz`
    pub fn load<P: AsRef<Path>>(path: P, with_reverse: bool) -> ReadResult<Self> {
        let path = path.as_ref();
        let store = if path.to_string_lossy().ends_with(".gz") {
            let decoder = GzDecoder::new(File::open(path)?);
            Self::from_reader(BufReader::new(decoder), with_reverse)?
        } else {
            let mut store = Self::new(with_reverse);
            let mut reader = parse_fastx_file(path).map_err(|e| ReadError::Parse(e.to_string()))?;
            while let Some(record) = reader.next() {
                let record = record.map_err(|e| ReadError::Parse(e.to_string()))?;
                store.push(&first_word(record.id()), &record.seq(), record.qual());
            }
            store
        };

        if store.is_empty() {
            return Err(ReadError::Empty);
        }
        info!(
            "Loaded {} reads from {} (max length {})",
            store.len(),
            path.display(),
            store.max_length()
        );
        Ok(store)
    }

    /// Parse FASTA/FASTQ data from any readable source
    pub fn from_reader<R: std::io::Read + Send>(reader: R, with_reverse: bool) -> ReadResult<Self> {
        let mut store = Self::new(with_reverse);
        let mut fastx_reader = parse_fastx_reader(reader).map_err(|e| ReadError::Parse(e.to_string()))?;
        while let Some(record) = fastx_reader.next() {
            let record = record.map_err(|e| ReadError::Parse(e.to_string()))?;
            store.push(&first_word(record.id()), &record.seq(), record.qual());
        }
        Ok(store)
    }

    /// Add one read
    pub fn push(&mut self, name: &str, seq: &[u8], quality: Option<&[u8]>) {
        let forward = normalise(seq);
        let reverse = self.with_reverse.then(|| revcomp(forward.as_slice()));
        self.reads.push(StoredRead {
            name: name.to_string(),
            forward,
            reverse,
            quality: quality.map(|q| q.to_vec()),
        });
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

impl ReadSource for ReadStore {
    fn sequence_count(&self) -> usize {
        self.reads.len()
    }

    fn forward_sequence(&self, id: usize) -> &[u8] {
        &self.reads[id].forward
    }

    fn reverse_complement(&self, id: usize) -> Option<&[u8]> {
        self.reads[id].reverse.as_deref()
    }

    fn quality(&self, id: usize) -> Option<&[u8]> {
        self.reads[id].quality.as_deref()
    }

    fn def_name(&self, id: usize) -> &str {
        &self.reads[id].name
    }
}
