//! Genome (horizontal sequence) sources
//!
//! Chromosomes are streamed rather than loaded: a source hands out one
//! chromosome header at a time and then yields its bases on demand. The
//! [`ChunkCursor`] pulls just enough bases to build each padded scan window,
//! so only a window's worth of a chromosome is ever resident. A file-of-files
//! (`.fof`) lists FASTA files to be read in order.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info};
use thiserror::Error;

/// Definition-line prefix marking the reverse strand of a chromosome
pub const REVERSE_STRAND_PREFIX: &str = "#RC.pash.";

/// Template base outside the chromosome
pub const PAD_BASE: u8 = b'@';

#[derive(Debug, Error)]
pub enum GenomeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("File list {0} names no files")]
    EmptyFileList(PathBuf),

    #[error("Chromosome {name} ended after {found} of {expected} bases")]
    Truncated {
        name: String,
        expected: usize,
        found: usize,
    },
}

pub type GenomeResult<T> = Result<T, GenomeError>;

/// One chromosome, as announced before its bases are read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizontalSequence {
    /// Position of the chromosome in the genome input, from 0
    pub index: usize,
    pub name: String,
    /// Total number of bases
    pub length: usize,
}

impl HorizontalSequence {
    pub fn new(index: usize, name: impl Into<String>, length: usize) -> Self {
        Self {
            index,
            name: name.into(),
            length,
        }
    }

    /// Name of the forward chromosome when this is a `#RC.pash.` reverse strand
    pub fn reverse_strand_of(&self) -> Option<&str> {
        self.name.strip_prefix(REVERSE_STRAND_PREFIX)
    }
}

/// Sequential, streaming access to the chromosomes of a genome
pub trait GenomeSource {
    /// Advance to the next chromosome, `None` once the genome is exhausted.
    ///
    /// Bases of the previous chromosome that were never read are skipped.
    fn next_sequence(&mut self) -> GenomeResult<Option<HorizontalSequence>>;

    /// Append up to `max` uppercased bases of the current chromosome to `out`.
    ///
    /// Returns the number appended; 0 means the chromosome is exhausted.
    fn read_bases(&mut self, out: &mut Vec<u8>, max: usize) -> GenomeResult<usize>;

    /// Restart from the first chromosome
    fn rewind(&mut self) -> GenomeResult<()>;
}

/// Chromosomes held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryGenomeSource {
    sequences: Vec<(String, Vec<u8>)>,
    next: usize,
    /// Current chromosome and the next base to hand out
    cursor: Option<(usize, usize)>,
}

impl MemoryGenomeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sequence(mut self, name: impl Into<String>, bases: &[u8]) -> Self {
        self.push(name, bases);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, bases: &[u8]) {
        self.sequences.push((name.into(), bases.to_ascii_uppercase()));
    }
}

impl GenomeSource for MemoryGenomeSource {
    fn next_sequence(&mut self) -> GenomeResult<Option<HorizontalSequence>> {
        let Some((name, bases)) = self.sequences.get(self.next) else {
            self.cursor = None;
            return Ok(None);
        };
        let sequence = HorizontalSequence::new(self.next, name.clone(), bases.len());
        self.cursor = Some((self.next, 0));
        self.next += 1;
        Ok(Some(sequence))
    }

    fn read_bases(&mut self, out: &mut Vec<u8>, max: usize) -> GenomeResult<usize> {
        let Some((sequence, position)) = self.cursor.as_mut() else {
            return Ok(0);
        };
        let bases = &self.sequences[*sequence].1;
        let end = (*position + max).min(bases.len());
        out.extend_from_slice(&bases[*position..end]);
        let added = end - *position;
        *position = end;
        Ok(added)
    }

    fn rewind(&mut self) -> GenomeResult<()> {
        self.next = 0;
        self.cursor = None;
        Ok(())
    }
}

/// A classified FASTA line
enum FastaLine {
    /// Definition line, carrying the first word of its name
    Defline(String),
    /// Sequence line; the line buffer holds its uppercased bases
    Bases,
}

/// Read the next meaningful line into `buf`.
///
/// Blank lines and `;` comments are skipped. Sequence lines lose their
/// whitespace and are uppercased.
fn read_fasta_line(reader: &mut dyn BufRead, buf: &mut Vec<u8>) -> std::io::Result<Option<FastaLine>> {
    loop {
        buf.clear();
        if reader.read_until(b'\n', buf)? == 0 {
            return Ok(None);
        }
        match buf.first() {
            Some(b'>') => {
                let name = String::from_utf8_lossy(&buf[1..])
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_string();
                return Ok(Some(FastaLine::Defline(name)));
            }
            Some(b';') => continue,
            _ => {
                buf.retain(|b| !b.is_ascii_whitespace());
                if buf.is_empty() {
                    continue;
                }
                buf.make_ascii_uppercase();
                return Ok(Some(FastaLine::Bases));
            }
        }
    }
}

fn open_reader(path: &Path) -> GenomeResult<Box<dyn BufRead>> {
    debug!("Opening genome file {}", path.display());
    let file = File::open(path)?;
    if path.to_string_lossy().ends_with(".gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Record the name and length of every chromosome in `path`
fn index_file(path: &Path, headers: &mut Vec<HorizontalSequence>) -> GenomeResult<()> {
    let mut reader = open_reader(path)?;
    let mut line = Vec::new();
    while let Some(kind) = read_fasta_line(reader.as_mut(), &mut line)? {
        match kind {
            FastaLine::Defline(name) => {
                let index = headers.len();
                headers.push(HorizontalSequence::new(index, name, 0));
            }
            FastaLine::Bases => match headers.last_mut() {
                Some(header) => header.length += line.len(),
                None => {
                    return Err(GenomeError::Parse {
                        path: path.to_path_buf(),
                        message: "sequence data before the first definition line".to_string(),
                    })
                }
            },
        }
    }
    Ok(())
}

/// FASTA genome streamed from disk.
///
/// Opening the source makes one pass over every file to learn chromosome
/// names and lengths; scanning then reads the files again line by line.
pub struct FastaGenomeSource {
    files: Vec<PathBuf>,
    headers: Vec<HorizontalSequence>,
    file_index: usize,
    reader: Option<Box<dyn BufRead>>,
    next_header: usize,
    /// A definition line was consumed while reading bases
    pending_defline: bool,
    in_sequence: bool,
    line: Vec<u8>,
    line_pos: usize,
}

impl FastaGenomeSource {
    /// Open a FASTA file (`.gz` allowed) or a `.fof` list of FASTA files
    pub fn open<P: AsRef<Path>>(path: P) -> GenomeResult<Self> {
        let path = path.as_ref();
        let files = if path.extension().is_some_and(|ext| ext == "fof") {
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            let files: Vec<PathBuf> = fs::read_to_string(path)?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| {
                    let file = PathBuf::from(line);
                    if file.is_relative() {
                        base.join(file)
                    } else {
                        file
                    }
                })
                .collect();
            if files.is_empty() {
                return Err(GenomeError::EmptyFileList(path.to_path_buf()));
            }
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut headers = Vec::new();
        for file in &files {
            index_file(file, &mut headers)?;
        }
        info!(
            "Genome input: {} file(s), {} chromosomes, {} bases",
            files.len(),
            headers.len(),
            headers.iter().map(|h| h.length).sum::<usize>()
        );
        Ok(Self {
            files,
            headers,
            file_index: 0,
            reader: None,
            next_header: 0,
            pending_defline: false,
            in_sequence: false,
            line: Vec::new(),
            line_pos: 0,
        })
    }

    fn start_sequence(&mut self) -> GenomeResult<Option<HorizontalSequence>> {
        let header = self.headers.get(self.next_header).cloned().ok_or_else(|| GenomeError::Parse {
            path: self.files[self.file_index.min(self.files.len() - 1)].clone(),
            message: "more chromosomes than when the genome was opened".to_string(),
        })?;
        self.next_header += 1;
        self.in_sequence = true;
        self.line.clear();
        self.line_pos = 0;
        Ok(Some(header))
    }

    fn end_sequence(&mut self) {
        self.in_sequence = false;
        self.line.clear();
        self.line_pos = 0;
    }
}

impl GenomeSource for FastaGenomeSource {
    fn next_sequence(&mut self) -> GenomeResult<Option<HorizontalSequence>> {
        self.end_sequence();
        if self.pending_defline {
            self.pending_defline = false;
            return self.start_sequence();
        }
        loop {
            if self.reader.is_none() {
                let Some(path) = self.files.get(self.file_index) else {
                    return Ok(None);
                };
                self.reader = Some(open_reader(path)?);
            }
            let Some(reader) = self.reader.as_mut() else {
                continue;
            };
            match read_fasta_line(reader.as_mut(), &mut self.line)? {
                Some(FastaLine::Defline(_)) => return self.start_sequence(),
                // rest of a chromosome the caller stopped reading
                Some(FastaLine::Bases) => continue,
                None => {
                    self.reader = None;
                    self.file_index += 1;
                }
            }
        }
    }

    fn read_bases(&mut self, out: &mut Vec<u8>, max: usize) -> GenomeResult<usize> {
        let mut added = 0;
        while added < max && self.in_sequence {
            if self.line_pos < self.line.len() {
                let n = (max - added).min(self.line.len() - self.line_pos);
                out.extend_from_slice(&self.line[self.line_pos..self.line_pos + n]);
                self.line_pos += n;
                added += n;
                continue;
            }
            let Some(reader) = self.reader.as_mut() else {
                self.end_sequence();
                break;
            };
            match read_fasta_line(reader.as_mut(), &mut self.line)? {
                Some(FastaLine::Bases) => self.line_pos = 0,
                Some(FastaLine::Defline(_)) => {
                    self.pending_defline = true;
                    self.end_sequence();
                }
                None => self.end_sequence(),
            }
        }
        Ok(added)
    }

    fn rewind(&mut self) -> GenomeResult<()> {
        self.reader = None;
        self.file_index = 0;
        self.next_header = 0;
        self.pending_defline = false;
        self.end_sequence();
        Ok(())
    }
}

/// One padded scan window handed out by a [`ChunkCursor`]
#[derive(Debug)]
pub struct ChunkWindow<'c> {
    /// First chunk base, inclusive
    pub start: usize,
    /// Last chunk base, inclusive
    pub stop: usize,
    /// Chromosome position of `template[0]`; negative inside the left padding
    pub template_start: i64,
    /// Chunk bases with `pad` bases of context on both sides, `@` off the ends
    pub template: &'c [u8],
    pad: usize,
}

impl ChunkWindow<'_> {
    /// The chunk's own bases
    pub fn bases(&self) -> &[u8] {
        &self.template[self.pad..self.pad + self.stop - self.start + 1]
    }
}

/// Cuts a streamed chromosome into overlapping chunks.
///
/// Chunks are `2 * diagonals` bases long and start every `diagonals` bases.
/// Bases are pulled from the source only as far as the current window needs,
/// and bases left of the current window are dropped.
#[derive(Debug)]
pub struct ChunkCursor {
    diagonals: usize,
    pad: usize,
    name: String,
    length: usize,
    next_index: usize,
    chunk_count: usize,
    /// Bases still needed; `buffer[0]` is chromosome position `buffer_start`
    buffer: Vec<u8>,
    buffer_start: usize,
    template: Vec<u8>,
}

impl ChunkCursor {
    pub fn new(diagonals: usize, pad: usize) -> Self {
        Self {
            diagonals: diagonals.max(1),
            pad,
            name: String::new(),
            length: 0,
            next_index: 0,
            chunk_count: 0,
            buffer: Vec::new(),
            buffer_start: 0,
            template: Vec::new(),
        }
    }

    /// Start cutting a new chromosome
    pub fn reset(&mut self, chrom: &HorizontalSequence) {
        self.name.clone_from(&chrom.name);
        self.length = chrom.length;
        self.next_index = 0;
        self.chunk_count = if chrom.length == 0 {
            0
        } else {
            (chrom.length - 1) / self.diagonals + 1
        };
        self.buffer.clear();
        self.buffer_start = 0;
    }

    /// Chunks of the current chromosome
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Bases currently held for the chromosome
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next window of the current chromosome, `None` after the last chunk
    pub fn next_chunk<G>(&mut self, genome: &mut G) -> GenomeResult<Option<ChunkWindow<'_>>>
    where
        G: GenomeSource + ?Sized,
    {
        if self.next_index >= self.chunk_count {
            return Ok(None);
        }
        let start = self.diagonals * self.next_index;
        let stop = (start + 2 * self.diagonals - 1).min(self.length - 1);
        self.next_index += 1;

        let keep_from = start.saturating_sub(self.pad);
        if keep_from > self.buffer_start {
            let dropped = (keep_from - self.buffer_start).min(self.buffer.len());
            self.buffer.drain(..dropped);
            self.buffer_start += dropped;
        }

        let wanted = (stop + self.pad + 1).min(self.length);
        while self.buffer_start + self.buffer.len() < wanted {
            let missing = wanted - self.buffer_start - self.buffer.len();
            if genome.read_bases(&mut self.buffer, missing)? == 0 {
                return Err(GenomeError::Truncated {
                    name: self.name.clone(),
                    expected: self.length,
                    found: self.buffer_start + self.buffer.len(),
                });
            }
        }

        let template_start = start as i64 - self.pad as i64;
        let template_stop = (stop + self.pad) as i64;
        let buffer_start = self.buffer_start as i64;
        let buffer = &self.buffer;
        self.template.clear();
        self.template.extend((template_start..=template_stop).map(|p| {
            usize::try_from(p - buffer_start)
                .ok()
                .and_then(|i| buffer.get(i))
                .copied()
                .unwrap_or(PAD_BASE)
        }));

        Ok(Some(ChunkWindow {
            start,
            stop,
            template_start,
            template: &self.template,
            pad: self.pad,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn read_all<G: GenomeSource>(source: &mut G) -> Vec<u8> {
        let mut bases = Vec::new();
        while source.read_bases(&mut bases, 3).unwrap() > 0 {}
        bases
    }

    fn windows(source: &mut MemoryGenomeSource, diagonals: usize, pad: usize) -> Vec<(usize, usize, i64, String)> {
        let chrom = source.next_sequence().unwrap().unwrap();
        let mut cursor = ChunkCursor::new(diagonals, pad);
        cursor.reset(&chrom);
        let mut out = Vec::new();
        while let Some(window) = cursor.next_chunk(source).unwrap() {
            out.push((
                window.start,
                window.stop,
                window.template_start,
                String::from_utf8(window.template.to_vec()).unwrap(),
            ));
        }
        out
    }

    #[test]
    fn test_memory_source_rewinds() {
        let mut source = MemoryGenomeSource::new()
            .with_sequence("chr1", b"acgt")
            .with_sequence("chr2", b"GG");
        let first = source.next_sequence().unwrap().unwrap();
        assert_eq!(first.length, 4);
        assert_eq!(read_all(&mut source), b"ACGT");
        assert_eq!(source.next_sequence().unwrap().unwrap().index, 1);
        assert!(source.next_sequence().unwrap().is_none());
        source.rewind().unwrap();
        assert_eq!(source.next_sequence().unwrap().unwrap().name, "chr1");
    }

    #[test]
    fn test_reverse_strand_name() {
        let rc = HorizontalSequence::new(0, "#RC.pash.chr7", 1);
        assert_eq!(rc.reverse_strand_of(), Some("chr7"));
        let fwd = HorizontalSequence::new(0, "chr7", 1);
        assert_eq!(fwd.reverse_strand_of(), None);
    }

    #[test]
    fn test_chunk_bounds() {
        let bases = vec![b'A'; 250];
        let mut source = MemoryGenomeSource::new().with_sequence("chr1", &bases);
        let bounds: Vec<_> = windows(&mut source, 100, 101).into_iter().map(|w| (w.0, w.1)).collect();
        assert_eq!(bounds, vec![(0, 199), (100, 249), (200, 249)]);

        let mut source = MemoryGenomeSource::new().with_sequence("chr1", &bases[..101]);
        let bounds: Vec<_> = windows(&mut source, 100, 101).into_iter().map(|w| (w.0, w.1)).collect();
        assert_eq!(bounds, vec![(0, 100), (100, 100)]);

        let mut source = MemoryGenomeSource::new().with_sequence("empty", b"");
        assert!(windows(&mut source, 100, 101).is_empty());
    }

    #[test]
    fn test_windows_are_padded_templates() {
        let mut source = MemoryGenomeSource::new().with_sequence("chr1", b"ACGTACGTAC");
        assert_eq!(
            windows(&mut source, 4, 2),
            vec![
                (0, 7, -2, "@@ACGTACGTAC".to_string()),
                (4, 9, 2, "GTACGTAC@@".to_string()),
                (8, 9, 6, "GTAC@@".to_string()),
            ]
        );
    }

    #[test]
    fn test_cursor_buffer_stays_bounded() {
        let bases: Vec<u8> = (0..10_000).map(|i| b"ACGT"[i % 4]).collect();
        let mut source = MemoryGenomeSource::new().with_sequence("chr1", &bases);
        let chrom = source.next_sequence().unwrap().unwrap();
        let (diagonals, pad) = (100, 101);
        let mut cursor = ChunkCursor::new(diagonals, pad);
        cursor.reset(&chrom);
        let mut chunks = 0;
        while let Some(window) = cursor.next_chunk(&mut source).unwrap() {
            let start = window.start;
            assert_eq!(window.bases(), &bases[start..=window.stop]);
            chunks += 1;
            assert!(cursor.buffered() <= 2 * diagonals + 2 * pad);
        }
        assert_eq!(chunks, 100);
    }

    #[test]
    fn test_truncated_source() {
        let mut source = MemoryGenomeSource::new().with_sequence("chr1", b"ACGT");
        let mut cursor = ChunkCursor::new(4, 1);
        cursor.reset(&HorizontalSequence::new(0, "chr1", 20));
        source.next_sequence().unwrap();
        assert!(matches!(
            cursor.next_chunk(&mut source),
            Err(GenomeError::Truncated { expected: 20, found: 4, .. })
        ));
    }

    #[test]
    fn test_file_of_files() {
        let dir = tempdir().unwrap();
        let mut a = File::create(dir.path().join("a.fa")).unwrap();
        writeln!(a, ">chrA desc\nacgt\n\nACGT").unwrap();
        let mut b = File::create(dir.path().join("b.fa")).unwrap();
        writeln!(b, ";comment\n>chrB\nTTTT\n>chrC\nGGGG").unwrap();
        let fof = dir.path().join("genome.fof");
        fs::write(&fof, "a.fa\nb.fa\n").unwrap();

        let mut source = FastaGenomeSource::open(&fof).unwrap();
        let mut seen = Vec::new();
        while let Some(seq) = source.next_sequence().unwrap() {
            let bases = read_all(&mut source);
            assert_eq!(bases.len(), seq.length);
            seen.push((seq.index, seq.name, String::from_utf8(bases).unwrap()));
        }
        assert_eq!(
            seen,
            vec![
                (0, "chrA".to_string(), "ACGTACGT".to_string()),
                (1, "chrB".to_string(), "TTTT".to_string()),
                (2, "chrC".to_string(), "GGGG".to_string()),
            ]
        );

        source.rewind().unwrap();
        assert_eq!(source.next_sequence().unwrap().unwrap().name, "chrA");
    }

    #[test]
    fn test_unread_bases_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g.fa");
        fs::write(&path, ">one\nAAAA\nCCCC\n>two\nGG\n").unwrap();
        let mut source = FastaGenomeSource::open(&path).unwrap();

        source.next_sequence().unwrap();
        let mut bases = Vec::new();
        assert_eq!(source.read_bases(&mut bases, 2).unwrap(), 2);
        let two = source.next_sequence().unwrap().unwrap();
        assert_eq!((two.name.as_str(), two.length), ("two", 2));
        assert_eq!(read_all(&mut source), b"GG");
        assert!(source.next_sequence().unwrap().is_none());
    }

    #[test]
    fn test_bases_before_defline_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.fa");
        fs::write(&path, "ACGT\n>chr1\nACGT\n").unwrap();
        assert!(matches!(FastaGenomeSource::open(&path), Err(GenomeError::Parse { .. })));
    }

    #[test]
    fn test_empty_file_list() {
        let dir = tempdir().unwrap();
        let fof = dir.path().join("empty.fof");
        fs::write(&fof, "\n").unwrap();
        assert!(matches!(
            FastaGenomeSource::open(&fof),
            Err(GenomeError::EmptyFileList(_))
        ));
    }
}
