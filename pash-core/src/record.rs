//! Mapping records and the tab-separated line format
//!
//! One record is produced per accepted alignment. Lines start with
//! `seqId score seqLen chromLen $`; everything after the `$` column is what
//! ends up in the final output once the filter has appended the passing count.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::align::AlignmentSummary;
use crate::key::complement;
use crate::types::Strand;
use crate::variants::{VariantCall, VariantCalls};

/// One accepted alignment
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRecord {
    pub read_id: usize,
    pub score: i32,
    pub read_length: usize,
    pub read_name: String,
    /// Name written to the output (the forward name for a reverse strand)
    pub chrom_name: String,
    pub chrom_length: usize,
    pub strand: Strand,
    /// 0-based genome position of the first window base
    pub window_start: i64,
    pub summary: AlignmentSummary,
    pub calls: VariantCalls,
    pub quality: Option<Vec<u8>>,
    pub bisulfite: bool,
    /// Aligned against a `#RC.pash.` reverse-strand chromosome
    pub reverse_chromosome: bool,
}

impl MappingRecord {
    /// 1-based genome start and stop
    pub fn genome_span(&self) -> (i64, i64) {
        let start = self.window_start + self.summary.horizontal_start as i64;
        let stop = self.window_start + self.summary.horizontal_stop as i64;
        if self.reverse_chromosome {
            let len = self.chrom_length as i64;
            (len - stop, len - start)
        } else {
            (start + 1, stop + 1)
        }
    }

    fn output_strand(&self) -> char {
        if self.reverse_chromosome {
            '-'
        } else if self.bisulfite {
            '+'
        } else {
            self.strand.into()
        }
    }

    fn quality_at(&self, read_pos: usize) -> u32 {
        let index = if !self.bisulfite && self.strand == Strand::Reverse {
            (self.read_length - 1).saturating_sub(read_pos)
        } else {
            read_pos
        };
        self.quality
            .as_ref()
            .and_then(|q| q.get(index))
            .map(|&q| q as u32)
            .unwrap_or(0)
    }

    fn genome_pos(&self, window_pos: usize) -> i64 {
        if self.reverse_chromosome {
            self.chrom_length as i64 - (self.window_start + window_pos as i64)
        } else {
            self.window_start + 1 + window_pos as i64
        }
    }

    fn write_variants(&self, line: &mut String) {
        let snvs = &self.calls.snvs;
        let _ = write!(line, "\t{}\t", snvs.len());
        if snvs.is_empty() {
            line.push('-');
            return;
        }
        let mut write_one = |call: &VariantCall, allele: u8| {
            let _ = write!(
                line,
                "{}/{}/{},",
                self.genome_pos(call.window_pos),
                allele as char,
                self.quality_at(call.read_pos)
            );
        };
        if self.reverse_chromosome {
            for call in snvs.iter().rev() {
                write_one(call, complement(call.base));
            }
        } else {
            for call in snvs {
                write_one(call, call.base);
            }
        }
    }

    fn write_calls(&self, line: &mut String, calls: &[VariantCall], reversed: bool) {
        let _ = write!(line, "\t{}\t", calls.len());
        if calls.is_empty() {
            line.push('-');
            return;
        }
        let mut write_one = |call: &VariantCall| {
            let _ = write!(
                line,
                "{}/{},",
                self.genome_pos(call.window_pos),
                self.quality_at(call.read_pos)
            );
        };
        if reversed {
            calls.iter().rev().for_each(&mut write_one);
        } else {
            calls.iter().for_each(&mut write_one);
        }
    }

    /// Format the record as one spool line, including the trailing newline
    pub fn to_tab_line(&self) -> String {
        let s = &self.summary;
        let (genome_start, genome_stop) = self.genome_span();
        let mut line = String::with_capacity(256);
        let _ = write!(
            line,
            "{}\t{}\t{}\t{}\t$\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
            self.read_id,
            self.score,
            self.read_length,
            self.chrom_length,
            self.chrom_name,
            genome_start,
            genome_stop,
            self.read_name,
            s.vertical_start + 1,
            s.vertical_stop + 1,
            self.output_strand(),
            s.matches,
            s.mismatches,
            s.gaps(),
            s.gap_bases,
            s.blocks.len()
        );

        if self.reverse_chromosome {
            let chrom_len = self.chrom_length as i64;
            for block in &s.blocks {
                let _ = write!(line, "{},", block.size);
            }
            line.push('\t');
            for block in &s.blocks {
                let end = (block.size + block.horizontal_start) as i64 + self.window_start;
                let _ = write!(line, "{},", chrom_len + 1 - end);
            }
            line.push('\t');
            for block in &s.blocks {
                let _ = write!(
                    line,
                    "{},",
                    self.read_length as i64 + 1 - (block.vertical_start + block.size) as i64
                );
            }
        } else {
            for block in s.blocks.iter().rev() {
                let _ = write!(line, "{},", block.size);
            }
            line.push('\t');
            for block in s.blocks.iter().rev() {
                let _ = write!(line, "{},", self.window_start + 1 + block.horizontal_start as i64);
            }
            line.push('\t');
            for block in s.blocks.iter().rev() {
                let _ = write!(line, "{},", block.vertical_start + 1);
            }
        }

        self.write_variants(&mut line);

        if self.bisulfite {
            let rc = self.reverse_chromosome;
            self.write_calls(&mut line, &self.calls.cg, true);
            self.write_calls(&mut line, &self.calls.chg, true);
            self.write_calls(&mut line, &self.calls.chh, true);
            self.write_calls(&mut line, &self.calls.converted, rc);
        }

        line.push('\n');
        line
    }
}

/// Destination for accepted alignments
pub trait RecordSink {
    fn write_record(&mut self, record: &MappingRecord) -> io::Result<()>;
}

impl RecordSink for Vec<MappingRecord> {
    fn write_record(&mut self, record: &MappingRecord) -> io::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Writes records as tab lines
pub struct TabWriter<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> TabWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for TabWriter<W> {
    fn write_record(&mut self, record: &MappingRecord) -> io::Result<()> {
        self.writer.write_all(record.to_tab_line().as_bytes())?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::AlignedBlock;

    fn summary() -> AlignmentSummary {
        AlignmentSummary {
            matches: 7,
            mismatches: 1,
            vertical_gaps: 0,
            horizontal_gaps: 1,
            gap_bases: 1,
            vertical_start: 0,
            vertical_stop: 7,
            horizontal_start: 2,
            horizontal_stop: 10,
            blocks: vec![
                AlignedBlock {
                    vertical_start: 4,
                    horizontal_start: 7,
                    size: 4,
                },
                AlignedBlock {
                    vertical_start: 0,
                    horizontal_start: 2,
                    size: 4,
                },
            ],
        }
    }

    fn record(strand: Strand) -> MappingRecord {
        MappingRecord {
            read_id: 3,
            score: 5,
            read_length: 8,
            read_name: "read3".to_string(),
            chrom_name: "chr1".to_string(),
            chrom_length: 1000,
            strand,
            window_start: 100,
            summary: summary(),
            calls: VariantCalls {
                snvs: vec![VariantCall {
                    window_pos: 3,
                    read_pos: 1,
                    base: b'A',
                }],
                ..Default::default()
            },
            quality: Some(b"ABCDEFGH".to_vec()),
            bisulfite: false,
            reverse_chromosome: false,
        }
    }

    #[test]
    fn test_forward_line() {
        let line = record(Strand::Forward).to_tab_line();
        assert_eq!(
            line,
            "3\t5\t8\t1000\t$\tchr1\t103\t111\tread3\t1\t8\t+\t7\t1\t1\t1\t2\t\
             4,4,\t103,108,\t1,5,\t1\t104/A/66,\n"
        );
    }

    #[test]
    fn test_reverse_read_quality_is_mirrored() {
        let line = record(Strand::Reverse).to_tab_line();
        assert!(line.contains("\t-\t"));
        // read_pos 1 of an 8-base read maps to quality index 6 ('G')
        assert!(line.ends_with("\t1\t104/A/71,\n"));
    }

    #[test]
    fn test_missing_quality_is_zero() {
        let mut rec = record(Strand::Forward);
        rec.quality = None;
        assert!(rec.to_tab_line().ends_with("104/A/0,\n"));
    }

    #[test]
    fn test_bisulfite_forward_lists() {
        let mut rec = record(Strand::Forward);
        rec.bisulfite = true;
        rec.calls.snvs.clear();
        rec.calls.cg = vec![
            VariantCall {
                window_pos: 2,
                read_pos: 0,
                base: b'T',
            },
            VariantCall {
                window_pos: 8,
                read_pos: 5,
                base: b'C',
            },
        ];
        rec.calls.converted = vec![
            VariantCall {
                window_pos: 3,
                read_pos: 1,
                base: b'T',
            },
            VariantCall {
                window_pos: 4,
                read_pos: 2,
                base: b'T',
            },
        ];
        let line = rec.to_tab_line();
        assert!(line.ends_with("\t0\t-\t2\t109/70,103/65,\t0\t-\t0\t-\t2\t104/66,105/67,\n"));
    }

    #[test]
    fn test_reverse_chromosome_is_mirrored() {
        let mut rec = record(Strand::Forward);
        rec.bisulfite = true;
        rec.reverse_chromosome = true;
        let line = rec.to_tab_line();
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        assert_eq!(fields[5], "chr1");
        // window positions 2..=10 at offset 100 mirror to 890..=898
        assert_eq!((fields[6], fields[7]), ("890", "898"));
        assert_eq!(fields[11], "-");
        // storage order, mirrored
        assert_eq!(fields[17], "4,4,");
        assert_eq!(fields[18], "890,895,");
        assert_eq!(fields[19], "1,5,");
        // variant allele complemented, quality by read index
        assert_eq!(fields[21], "897/T/66,");
    }

    #[test]
    fn test_tab_writer_counts_records() {
        let mut writer = TabWriter::new(Vec::new());
        writer.write_record(&record(Strand::Forward)).unwrap();
        writer.write_record(&record(Strand::Forward)).unwrap();
        assert_eq!(writer.written(), 2);
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
