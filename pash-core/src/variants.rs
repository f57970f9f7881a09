//! Variant and methylation calling over aligned blocks

use crate::align::AlignmentSummary;

/// One called position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantCall {
    /// Index into the alignment window
    pub window_pos: usize,
    /// Index into the aligned read
    pub read_pos: usize,
    /// Read base at the position
    pub base: u8,
}

/// Calls grouped by class; a position lands in at most one list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariantCalls {
    pub snvs: Vec<VariantCall>,
    pub cg: Vec<VariantCall>,
    pub chg: Vec<VariantCall>,
    pub chh: Vec<VariantCall>,
    pub converted: Vec<VariantCall>,
}

impl VariantCalls {
    pub fn is_empty(&self) -> bool {
        self.snvs.is_empty()
            && self.cg.is_empty()
            && self.chg.is_empty()
            && self.chh.is_empty()
            && self.converted.is_empty()
    }
}

/// Walk the blocks of `summary` (first block of the read first) and classify
/// every position.
///
/// In bisulfite mode a genome `C` covered by a read `C` (methylated) or `T`
/// (converted) is a methylation call in `CG` or `CHG` context; outside those
/// contexts a read `C` is a `CHH` call and a read `T` a plain conversion. Any
/// other disagreement is an SNV carrying the read base.
pub fn call_variants(read: &[u8], window: &[u8], summary: &AlignmentSummary, bisulfite: bool) -> VariantCalls {
    let mut calls = VariantCalls::default();
    let genome_at = |pos: usize| window.get(pos).copied().unwrap_or(b'@');

    for block in summary.blocks.iter().rev() {
        for offset in 0..block.size {
            let window_pos = block.horizontal_start + offset;
            let read_pos = block.vertical_start + offset;
            let base = read.get(read_pos).copied().unwrap_or(b'N');
            let genome = genome_at(window_pos);
            let call = VariantCall {
                window_pos,
                read_pos,
                base,
            };

            if bisulfite && genome == b'C' && (base == b'C' || base == b'T') {
                if genome_at(window_pos + 1) == b'G' {
                    calls.cg.push(call);
                } else if genome_at(window_pos + 2) == b'G' {
                    calls.chg.push(call);
                } else if base == b'C' {
                    calls.chh.push(call);
                } else {
                    calls.converted.push(call);
                }
            } else if base != genome {
                calls.snvs.push(call);
            }
        }
    }
    calls
}
