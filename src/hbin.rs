//! Hive bin (hbin) block parsing and the bin index.
//!
//! The hive's data area is a run of 4KB-aligned bins, each opening with a
//! small header followed by cells. The [`BinIndex`] records every bin found
//! in the hive and answers the "is this offset inside a known bin?" probe
//! that corruption-tolerant traversal relies on.

use crate::error::{RegistryError, Result};
use crate::utils::{read_u32_le, read_u64_le};

/// Expected signature for hive bins ("hbin").
pub const HBIN_SIGNATURE: &[u8; 4] = b"hbin";

/// Minimum size of an hbin header.
pub const HBIN_HEADER_SIZE: usize = 0x20;

/// Header at the start of every hive bin.
///
/// Only the fields traversal needs are kept; the reserved words in the
/// header are skipped over.
#[derive(Debug, Clone)]
pub struct HbinHeader {
    /// Declared distance of this bin from the first hbin.
    pub offset: u32,

    /// Total bin size in bytes, header included.
    pub size: u32,

    /// Write timestamp (FILETIME; only meaningful in the first bin).
    pub timestamp: u64,
}

impl HbinHeader {
    /// Decodes a bin header found at `expected_offset`.
    ///
    /// The header stores its own distance from the first bin; a header
    /// that disagrees with where the scan actually found it is treated as
    /// corrupt rather than trusted.
    ///
    /// # Errors
    ///
    /// Fails on a short buffer, a wrong signature, or a lying offset
    /// field.
    pub fn parse(data: &[u8], expected_offset: u32) -> Result<Self> {
        if data.len() < HBIN_HEADER_SIZE {
            return Err(RegistryError::TruncatedData {
                offset: expected_offset,
                expected: HBIN_HEADER_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..4] != HBIN_SIGNATURE {
            return Err(RegistryError::invalid_signature(HBIN_SIGNATURE, &data[0..4]));
        }

        let offset = read_u32_le(data, 0x04)?;
        if offset != expected_offset {
            return Err(RegistryError::InvalidFormat(format!(
                "Bin found at {:#x} claims to be at {:#x}",
                expected_offset, offset
            )));
        }

        Ok(HbinHeader {
            offset,
            size: read_u32_le(data, 0x08)?,
            timestamp: read_u64_le(data, 0x14)?,
        })
    }
}

/// A hive bin as recorded in the [`BinIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HiveBin {
    /// Offset of the bin from the first hbin.
    pub offset: u32,

    /// Size of the bin in bytes (including its header).
    pub size: u32,
}

impl HiveBin {
    /// Returns true if a cell at `offset` could live inside this bin.
    ///
    /// Cells start after the 32-byte bin header, so offsets inside the
    /// header area are rejected.
    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.offset + HBIN_HEADER_SIZE as u32
            && offset < self.offset + self.size
    }
}

/// Index of all hive bins found in a hive.
///
/// Built once when the hive is opened by walking the bin headers from the
/// first hbin to the end of the data. Traversal uses it to decide whether a
/// referenced cell offset is worth dereferencing at all.
#[derive(Debug, Clone)]
pub struct BinIndex {
    /// Bins in file order (which is also offset order).
    bins: Vec<HiveBin>,
}

impl BinIndex {
    /// Scans the hive-bins area and records every bin.
    ///
    /// # Arguments
    ///
    /// * `data` - Hive bytes starting at the first hbin (base block stripped).
    ///
    /// Scanning stops at the first non-hbin signature, which marks padding
    /// or the end of the file (same rule the hive loader applies).
    pub fn scan(data: &[u8]) -> Result<Self> {
        let mut bins = Vec::new();
        let mut offset = 0usize;

        while offset + HBIN_HEADER_SIZE <= data.len() {
            let header = match HbinHeader::parse(&data[offset..], offset as u32) {
                Ok(header) => header,
                Err(RegistryError::InvalidSignature { .. }) => break,
                Err(e) => return Err(e),
            };

            // A zero or sub-header size would stall the scan
            if (header.size as usize) < HBIN_HEADER_SIZE {
                return Err(RegistryError::InvalidFormat(format!(
                    "Hbin at {:#x} has impossible size {:#x}",
                    offset, header.size
                )));
            }

            let size = (header.size as usize).min(data.len() - offset) as u32;
            bins.push(HiveBin {
                offset: offset as u32,
                size,
            });
            offset += size as usize;
        }

        Ok(Self { bins })
    }

    /// Returns the index of the bin containing `offset`, or `None` if the
    /// offset is not inside any known bin.
    ///
    /// This is the validity probe used to mark corruption without aborting:
    /// it never errors.
    pub fn index_of(&self, offset: u32) -> Option<usize> {
        let candidate = self
            .bins
            .partition_point(|bin| bin.offset <= offset)
            .checked_sub(1)?;

        self.bins[candidate].contains(offset).then_some(candidate)
    }

    /// Returns the bin at `index`.
    pub fn get(&self, index: usize) -> Option<&HiveBin> {
        self.bins.get(index)
    }

    /// Returns the number of bins in the hive.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Returns true if no bins were found.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_hbin(offset: u32, size: u32) -> Vec<u8> {
        let mut data = vec![0u8; size as usize];
        data[0..4].copy_from_slice(b"hbin");
        data[0x04..0x08].copy_from_slice(&offset.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&size.to_le_bytes());
        data
    }

    #[test]
    fn test_parse_header_fields() {
        let mut raw = make_hbin(0x2000, 0x1000);
        raw[0x14..0x1C].copy_from_slice(&0x1122_3344u64.to_le_bytes());

        let header = HbinHeader::parse(&raw, 0x2000).unwrap();
        assert_eq!(header.offset, 0x2000);
        assert_eq!(header.size, 0x1000);
        assert_eq!(header.timestamp, 0x1122_3344);
    }

    #[test]
    fn test_header_rejects_wrong_signature() {
        let mut raw = make_hbin(0, 0x1000);
        raw[0..4].copy_from_slice(b"regf");
        assert!(matches!(
            HbinHeader::parse(&raw, 0),
            Err(RegistryError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_header_rejects_lying_offset_field() {
        let raw = make_hbin(0x3000, 0x1000);
        // Found at 0x2000, claims 0x3000
        assert!(matches!(
            HbinHeader::parse(&raw, 0x2000),
            Err(RegistryError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_header_rejects_short_buffer() {
        let raw = make_hbin(0, 0x1000);
        assert!(matches!(
            HbinHeader::parse(&raw[..HBIN_HEADER_SIZE - 1], 0),
            Err(RegistryError::TruncatedData { .. })
        ));
    }

    #[test]
    fn test_scan_two_bins() {
        let mut data = make_hbin(0, 0x1000);
        data.extend(make_hbin(0x1000, 0x1000));

        let index = BinIndex::scan(&data).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1).unwrap().offset, 0x1000);
    }

    #[test]
    fn test_scan_stops_at_padding() {
        let mut data = make_hbin(0, 0x1000);
        data.extend(vec![0u8; 0x1000]);

        let index = BinIndex::scan(&data).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_index_of() {
        let mut data = make_hbin(0, 0x1000);
        data.extend(make_hbin(0x1000, 0x2000));

        let index = BinIndex::scan(&data).unwrap();

        // Inside the bin header area: not a valid cell offset
        assert_eq!(index.index_of(0x10), None);
        assert_eq!(index.index_of(0x20), Some(0));
        assert_eq!(index.index_of(0xFFF), Some(0));
        assert_eq!(index.index_of(0x1020), Some(1));
        assert_eq!(index.index_of(0x2FFF), Some(1));
        // Past the last bin
        assert_eq!(index.index_of(0x3000), None);
        assert_eq!(index.index_of(0xCCCC_CCCC), None);
    }

    #[test]
    fn test_scan_rejects_zero_size() {
        let mut data = vec![0u8; 0x40];
        data[0..4].copy_from_slice(b"hbin");
        // offset 0, size 0
        let result = BinIndex::scan(&data);
        assert!(result.is_err());
    }
}
