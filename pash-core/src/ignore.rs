//! Seed ignore lists
//!
//! An ignore list is a bitmap over every key of a given weight, stored one bit
//! per key, least-significant bit first within each byte. Keys set in the
//! bitmap are skipped on both the read and the genome side.

use std::fs;
use std::io::Write;
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::types::{SeedKey, MAX_KEY_WEIGHT};

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ignore list is empty")]
    Empty,

    #[error("Ignore list covers {0} keys, which is not a power of 4")]
    NotPowerOfFour(u64),

    #[error("Ignore list weight {list} does not match mask weight {mask}")]
    WeightMismatch { list: usize, mask: usize },

    #[error("Key {key} out of range for an ignore list of weight {weight}")]
    KeyOutOfRange { key: SeedKey, weight: usize },
}

pub type IgnoreResult<T> = Result<T, IgnoreError>;

/// Bitmap of seed keys to skip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreList {
    weight: usize,
    bits: Vec<u8>,
}

impl IgnoreList {
    /// Interpret raw bitmap bytes, inferring the key weight from their size
    pub fn from_bytes(bits: Vec<u8>) -> IgnoreResult<Self> {
        if bits.is_empty() {
            return Err(IgnoreError::Empty);
        }
        let keys = bits.len() as u64 * 8;
        let weight = (1..=MAX_KEY_WEIGHT)
            .find(|w| 1u64 << (2 * w) == keys)
            .ok_or(IgnoreError::NotPowerOfFour(keys))?;
        Ok(Self { weight, bits })
    }

    /// Load a bitmap file
    pub fn load<P: AsRef<Path>>(path: P) -> IgnoreResult<Self> {
        let path = path.as_ref();
        let list = Self::from_bytes(fs::read(path)?)?;
        info!(
            "Loaded ignore list {} (weight {}, {} keys ignored)",
            path.display(),
            list.weight,
            list.ignored_count()
        );
        Ok(list)
    }

    /// Build a list of the given weight with `keys` set
    pub fn from_keys<I>(weight: usize, keys: I) -> IgnoreResult<Self>
    where
        I: IntoIterator<Item = SeedKey>,
    {
        // weight 1 would need half a byte
        if !(2..=MAX_KEY_WEIGHT).contains(&weight) {
            return Err(IgnoreError::NotPowerOfFour(1u64 << (2 * weight.min(MAX_KEY_WEIGHT))));
        }
        let mut list = Self {
            weight,
            bits: vec![0; (1usize << (2 * weight)) / 8],
        };
        for key in keys {
            let (byte, bit) = list.locate(key)?;
            list.bits[byte] |= 1 << bit;
        }
        Ok(list)
    }

    /// Write the bitmap in its on-disk layout
    pub fn write_to<W: Write>(&self, mut writer: W) -> IgnoreResult<()> {
        writer.write_all(&self.bits)?;
        Ok(())
    }

    pub fn weight(&self) -> usize {
        self.weight
    }

    pub fn ignored_count(&self) -> u64 {
        self.bits.iter().map(|b| b.count_ones() as u64).sum()
    }

    /// Fail unless the list was built for keys of `mask_weight` bases
    pub fn check_weight(&self, mask_weight: usize) -> IgnoreResult<()> {
        if self.weight != mask_weight {
            return Err(IgnoreError::WeightMismatch {
                list: self.weight,
                mask: mask_weight,
            });
        }
        Ok(())
    }

    fn locate(&self, key: SeedKey) -> IgnoreResult<(usize, u32)> {
        let byte = (key / 8) as usize;
        if byte >= self.bits.len() {
            return Err(IgnoreError::KeyOutOfRange {
                key,
                weight: self.weight,
            });
        }
        Ok((byte, key % 8))
    }

    pub fn is_ignored(&self, key: SeedKey) -> IgnoreResult<bool> {
        let (byte, bit) = self.locate(key)?;
        Ok(self.bits[byte] & (1 << bit) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_bit_layout() {
        // 4 bytes = 32 keys is not a power of 4; 2 bytes = 16 keys is weight 2
        let list = IgnoreList::from_bytes(vec![0b0000_0101, 0b1000_0000]).unwrap();
        assert_eq!(list.weight(), 2);
        assert!(list.is_ignored(0).unwrap());
        assert!(!list.is_ignored(1).unwrap());
        assert!(list.is_ignored(2).unwrap());
        assert!(list.is_ignored(15).unwrap());
        assert!(matches!(list.is_ignored(16), Err(IgnoreError::KeyOutOfRange { .. })));
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(matches!(IgnoreList::from_bytes(vec![]), Err(IgnoreError::Empty)));
        assert!(matches!(
            IgnoreList::from_bytes(vec![0; 4]),
            Err(IgnoreError::NotPowerOfFour(32))
        ));
    }

    #[test]
    fn test_weight_check() {
        let list = IgnoreList::from_keys(4, [3, 200]).unwrap();
        assert!(list.check_weight(4).is_ok());
        assert!(matches!(
            list.check_weight(12),
            Err(IgnoreError::WeightMismatch { list: 4, mask: 12 })
        ));
    }

    #[test]
    fn test_write_and_load() {
        let list = IgnoreList::from_keys(4, [3, 200]).unwrap();
        let file = NamedTempFile::new().unwrap();
        list.write_to(file.as_file()).unwrap();

        let loaded = IgnoreList::load(file.path()).unwrap();
        assert_eq!(loaded, list);
        assert_eq!(loaded.ignored_count(), 2);
        assert!(loaded.is_ignored(200).unwrap());
        assert!(!loaded.is_ignored(201).unwrap());
    }
}
