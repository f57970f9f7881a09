//! Top-percent output filter
//!
//! The spool holds every alignment accepted during the scan. Scores only rise
//! while scanning, so the final decision is made afterwards in two passes: the
//! first counts, per read, the mappings within the top fraction of the read's
//! best score; the second copies those lines out tagged with the count.

use std::io::{BufRead, Seek, SeekFrom, Write};

use log::{debug, info};
use thiserror::Error;

use crate::params::MapParams;
use crate::types::SequenceInfo;

const PAYLOAD_MARKER: &str = "\t$\t";

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed spool line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("Spool line {line} refers to unknown read {read}")]
    UnknownRead { line: u64, read: usize },
}

pub type FilterResult<T> = Result<T, FilterError>;

/// Read id, score and payload of one spool line
struct SpoolLine<'l> {
    read: usize,
    score: i32,
    payload: &'l str,
}

fn parse_line(text: &str, line: u64) -> FilterResult<SpoolLine<'_>> {
    let malformed = |reason: &str| FilterError::Malformed {
        line,
        reason: reason.to_string(),
    };
    let mut fields = text.splitn(3, '\t');
    let read = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| malformed("bad read id"))?;
    let score = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| malformed("bad score"))?;
    let payload = text
        .find(PAYLOAD_MARKER)
        .map(|at| &text[at + PAYLOAD_MARKER.len()..])
        .ok_or_else(|| malformed("missing '$' column"))?;
    Ok(SpoolLine { read, score, payload })
}

/// Selects the spool lines within the top fraction of each read's best score
pub struct OutputFilter<'a> {
    infos: &'a mut [SequenceInfo],
    params: &'a MapParams,
}

impl<'a> OutputFilter<'a> {
    pub fn new(infos: &'a mut [SequenceInfo], params: &'a MapParams) -> Self {
        Self { infos, params }
    }

    fn passes(&self, info: &SequenceInfo, score: i32) -> bool {
        info.passing_mappings <= self.params.max_mappings && self.params.within_top(score, info.best_sw_score)
    }

    fn info_index(&self, read: usize, line: u64) -> FilterResult<usize> {
        if read < self.infos.len() {
            Ok(read)
        } else {
            Err(FilterError::UnknownRead { line, read })
        }
    }

    /// First pass: count passing mappings per read
    pub fn tally<R: BufRead>(&mut self, reader: R) -> FilterResult<u64> {
        for info in self.infos.iter_mut() {
            info.passing_mappings = 0;
        }
        let mut counted = 0;
        for (n, text) in reader.lines().enumerate() {
            let text = text?;
            if text.is_empty() {
                continue;
            }
            let line = n as u64 + 1;
            let parsed = parse_line(&text, line)?;
            let read = self.info_index(parsed.read, line)?;
            if self.passes(&self.infos[read], parsed.score) {
                self.infos[read].passing_mappings += 1;
                counted += 1;
            }
        }
        debug!("Filter pass 1 counted {} candidate mappings", counted);
        Ok(counted)
    }

    /// Second pass: copy passing lines, tagged with the read's passing count
    pub fn write_passing<R: BufRead, W: Write>(&self, reader: R, mut writer: W) -> FilterResult<u64> {
        let mut written = 0;
        for (n, text) in reader.lines().enumerate() {
            let text = text?;
            if text.is_empty() {
                continue;
            }
            let line = n as u64 + 1;
            let parsed = parse_line(&text, line)?;
            let info = &self.infos[self.info_index(parsed.read, line)?];
            if self.passes(info, parsed.score) {
                writeln!(
                    writer,
                    "{}\t{}",
                    parsed.payload.trim_end_matches('\r'),
                    info.passing_mappings
                )?;
                written += 1;
            }
        }
        writer.flush()?;
        Ok(written)
    }

    /// Run both passes over a seekable spool; returns the lines written
    pub fn run<R: BufRead + Seek, W: Write>(&mut self, spool: &mut R, writer: W) -> FilterResult<u64> {
        spool.seek(SeekFrom::Start(0))?;
        self.tally(&mut *spool)?;
        spool.seek(SeekFrom::Start(0))?;
        let written = self.write_passing(&mut *spool, writer)?;
        info!("Output filter wrote {} mappings", written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn spool_line(read: usize, score: i32, tail: &str) -> String {
        format!("{}\t{}\t30\t1000\t$\tchr1\t{}\n", read, score, tail)
    }

    fn infos(best: &[i32]) -> Vec<SequenceInfo> {
        best.iter()
            .map(|&b| SequenceInfo {
                best_sw_score: b,
                ..SequenceInfo::new(30)
            })
            .collect()
    }

    #[test]
    fn test_top_percent_and_count_tag() {
        let text = [
            spool_line(0, 10, "a"),
            spool_line(0, 9, "b"),
            spool_line(0, 5, "c"),
        ]
        .concat();
        let mut infos = infos(&[10]);
        let params = MapParams {
            top_percent: 0.2,
            max_mappings: 2,
            ..Default::default()
        };
        let mut out = Vec::new();
        let written = OutputFilter::new(&mut infos, &params)
            .run(&mut Cursor::new(text), &mut out)
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "chr1\ta\t2\nchr1\tb\t2\n");
        assert_eq!(infos[0].passing_mappings, 2);
    }

    #[test]
    fn test_too_many_mappings_drops_read() {
        let text = [
            spool_line(0, 10, "a"),
            spool_line(0, 10, "b"),
            spool_line(1, 7, "c"),
        ]
        .concat();
        let mut infos = infos(&[10, 7]);
        let params = MapParams {
            max_mappings: 1,
            ..Default::default()
        };
        let mut out = Vec::new();
        let written = OutputFilter::new(&mut infos, &params)
            .run(&mut Cursor::new(text), &mut out)
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "chr1\tc\t1\n");
    }

    #[test]
    fn test_malformed_and_unknown_lines() {
        let mut infos = infos(&[10]);
        let params = MapParams::default();
        let mut filter = OutputFilter::new(&mut infos, &params);
        assert!(matches!(
            filter.tally(Cursor::new("x\t1\t$\tchr\n")),
            Err(FilterError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            filter.tally(Cursor::new("0\t1\tno marker\n")),
            Err(FilterError::Malformed { .. })
        ));
        assert!(matches!(
            filter.tally(Cursor::new(spool_line(4, 1, "z"))),
            Err(FilterError::UnknownRead { read: 4, .. })
        ));
    }
}
