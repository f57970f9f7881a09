//! Two-bit packing of short DNA k-mers
//!
//! `A=00, T=01, G=10, C=11`, base 0 in the lowest two bits.

use crate::types::SeedKey;

const DECODE_TABLE: [char; 4] = ['A', 'T', 'G', 'C'];

fn base_code(base: u8) -> Option<u32> {
    match base {
        b'A' | b'a' => Some(0),
        b'T' | b't' => Some(1),
        b'G' | b'g' => Some(2),
        b'C' | b'c' => Some(3),
        _ => None,
    }
}

/// Pack a k-mer of at most 16 bases.
///
/// Characters outside `ACGTacgt` leave their bit field at zero.
pub fn encode(seq: &[u8]) -> SeedKey {
    encode_bases(seq.iter().copied())
}

/// Pack bases produced by an iterator, the first one going into the low bits.
pub fn encode_bases<I>(bases: I) -> SeedKey
where
    I: IntoIterator<Item = u8>,
{
    let mut key: SeedKey = 0;
    for (n, base) in bases.into_iter().enumerate() {
        if let Some(code) = base_code(base) {
            key |= code << (n << 1);
        }
    }
    key
}

/// Unpack the first `len` bases of a key.
pub fn decode(key: SeedKey, len: usize) -> String {
    (0..len)
        .map(|n| DECODE_TABLE[((key >> (n << 1)) & 3) as usize])
        .collect()
}

/// Watson-Crick complement, `N` for anything else.
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' | b'a' => b'T',
        b'T' | b't' => b'A',
        b'G' | b'g' => b'C',
        b'C' | b'c' => b'G',
        _ => b'N',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode(b"A"), 0);
        assert_eq!(encode(b"T"), 1);
        assert_eq!(encode(b"G"), 2);
        assert_eq!(encode(b"C"), 3);
        // base 0 in the low bits
        assert_eq!(encode(b"AC"), 3 << 2);
        assert_eq!(encode(b"CA"), 3);
    }

    #[test]
    fn test_round_trip_mixed_case() {
        for s in ["ACGT", "acgtACGTacgtACGT", "ttttgggg", "C", "GATTACA"] {
            assert_eq!(decode(encode(s.as_bytes()), s.len()), s.to_uppercase());
        }
    }

    #[test]
    fn test_unknown_bases_leave_field_untouched() {
        assert_eq!(encode(b"NC"), encode(b"AC"));
        assert_eq!(encode(b"NNNN"), 0);
    }

    #[test]
    fn test_complement() {
        assert_eq!(complement(b'A'), b'T');
        assert_eq!(complement(b'c'), b'G');
        assert_eq!(complement(b'N'), b'N');
    }
}
