//! The cell source: maps 32-bit cell offsets to cell payloads.
//!
//! Every structure in a hive is referenced by a cell offset relative to the
//! first hbin. The [`CellSource`] owns the hive bytes (memory-mapped or
//! loaded), the parsed base block, and the [`BinIndex`], and turns an offset
//! into a bounds-checked payload slice.

use crate::error::{RegistryError, Result};
use crate::hbin::BinIndex;
use crate::header::{BaseBlock, BASE_BLOCK_SIZE};
use crate::utils::{cell_offset_to_absolute, read_i32_le};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Represents hive data storage.
enum HiveData {
    /// Memory-mapped file data.
    Mapped(Mmap),
    /// Owned data.
    Owned(Vec<u8>),
}

impl HiveData {
    /// Returns a slice of the hive data.
    fn as_slice(&self) -> &[u8] {
        match self {
            HiveData::Mapped(mmap) => mmap,
            HiveData::Owned(data) => data,
        }
    }

    /// Returns the length of the hive data.
    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// A borrowed cell payload.
///
/// The borrow is only guaranteed to stay valid until the next call into the
/// [`CellSource`]; callers that hold cell bytes across further lookups must
/// copy them first (the sub-key walker does exactly that before recursing).
#[derive(Debug, Clone, Copy)]
pub struct Cell<'a> {
    /// Cell offset this payload was fetched from (relative to first hbin).
    pub offset: u32,

    /// Payload bytes, with the leading size field already stripped.
    pub data: &'a [u8],
}

impl Cell<'_> {
    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Resolves cell offsets against a single hive.
pub struct CellSource {
    /// Hive data - either memory-mapped or owned.
    data: HiveData,

    /// Parsed base block header.
    base_block: BaseBlock,

    /// Index of every hbin in the file.
    bin_index: BinIndex,
}

impl CellSource {
    /// Opens a registry hive file read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is not a valid
    /// registry hive, or its header is corrupted.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening registry hive");
        let file = File::open(&path)?;

        // Validate file size BEFORE creating memory map
        let metadata = file.metadata()?;
        let file_size = metadata.len() as usize;

        if file_size < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: file_size,
                minimum: BASE_BLOCK_SIZE,
            });
        }

        // SAFETY: the file is opened read-only, its size has been validated
        // to cover the base block, the map's lifetime is tied to this
        // CellSource, and all access is bounds-checked through get().
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(size = mmap.len(), "Memory mapped hive file");

        Self::from_data(HiveData::Mapped(mmap))
    }

    /// Creates a cell source from owned hive bytes.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::from_data(HiveData::Owned(data))
    }

    fn from_data(data: HiveData) -> Result<Self> {
        let base_block = BaseBlock::parse(data.as_slice())?;

        if !base_block.is_consistent() {
            warn!(
                primary = base_block.primary_sequence,
                secondary = base_block.secondary_sequence,
                "Hive was not flushed cleanly; reading as-is"
            );
        }

        let bin_index = BinIndex::scan(&data.as_slice()[BASE_BLOCK_SIZE..])?;
        debug!(bins = bin_index.len(), "Scanned hive bins");

        Ok(Self {
            data,
            base_block,
            bin_index,
        })
    }

    /// Returns a reference to the base block header.
    pub fn base_block(&self) -> &BaseBlock {
        &self.base_block
    }

    /// Returns the size of the backing hive data in bytes.
    pub fn hive_size(&self) -> usize {
        self.data.len()
    }

    /// Returns the index of the hive bin containing `offset`, or `None` if
    /// the offset is not inside any known bin.
    ///
    /// This is the validity probe traversal uses to mark corruption without
    /// aborting; it never performs a cell read and never errors.
    pub fn index_of(&self, offset: u32) -> Option<usize> {
        self.bin_index.index_of(offset)
    }

    /// Fetches the cell at `offset`.
    ///
    /// # Returns
    ///
    /// The cell payload (excluding the size field).
    ///
    /// # Errors
    ///
    /// Fails if the offset is not inside a known hive bin, or the cell's
    /// size field is malformed, or the cell overruns the hive data.
    pub fn get(&self, offset: u32) -> Result<Cell<'_>> {
        if self.bin_index.index_of(offset).is_none() {
            return Err(RegistryError::invalid_offset(offset, self.data.len()));
        }

        let abs_offset = cell_offset_to_absolute(offset)? as usize;
        let data = self.data.as_slice();

        // Cell size precedes the payload
        let size = read_i32_le(data, abs_offset)?;

        // Negative size = allocated cell; either way the magnitude covers
        // the size field itself.
        let abs_size = size.unsigned_abs() as usize;

        if abs_size < 4 {
            return Err(RegistryError::invalid_cell_size(size, offset));
        }

        let data_start = abs_offset + 4;
        let data_end = abs_offset + abs_size;

        if data_end > data.len() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: abs_size,
                actual: data.len() - abs_offset,
            });
        }

        Ok(Cell {
            offset,
            data: &data[data_start..data_end],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::calculate_checksum;

    /// Builds a minimal hive: valid base block plus one 4KiB hbin holding a
    /// single cell at offset 0x20 with the given payload.
    fn minimal_hive(payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; BASE_BLOCK_SIZE + 0x1000];
        data[0..4].copy_from_slice(b"regf");
        data[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&1u32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        data[0x18..0x1C].copy_from_slice(&5u32.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&0x20u32.to_le_bytes());
        let checksum = calculate_checksum(&data);
        data[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        data[0x1000..0x1004].copy_from_slice(b"hbin");
        data[0x1008..0x100C].copy_from_slice(&0x1000u32.to_le_bytes());

        let cell_size = -((4 + payload.len()) as i32);
        data[0x1020..0x1024].copy_from_slice(&cell_size.to_le_bytes());
        data[0x1024..0x1024 + payload.len()].copy_from_slice(payload);

        data
    }

    #[test]
    fn test_get_cell_payload() {
        let source = CellSource::from_vec(minimal_hive(b"nk\x20\x00rest")).unwrap();
        let cell = source.get(0x20).unwrap();
        assert_eq!(cell.offset, 0x20);
        assert_eq!(&cell.data[0..2], b"nk");
        assert_eq!(cell.size(), 8);
    }

    #[test]
    fn test_get_outside_any_bin() {
        let source = CellSource::from_vec(minimal_hive(b"payload!")).unwrap();
        let result = source.get(0x4000);
        assert!(matches!(result, Err(RegistryError::InvalidOffset { .. })));
    }

    #[test]
    fn test_index_of_probe() {
        let source = CellSource::from_vec(minimal_hive(b"payload!")).unwrap();
        assert_eq!(source.index_of(0x20), Some(0));
        assert_eq!(source.index_of(0xCCCC_CCCC), None);
    }

    #[test]
    fn test_cell_size_too_small() {
        let mut hive = minimal_hive(b"payload!");
        // Corrupt the cell's size field to 2 (< size of the field itself)
        hive[0x1020..0x1024].copy_from_slice(&2i32.to_le_bytes());
        let source = CellSource::from_vec(hive).unwrap();
        assert!(matches!(
            source.get(0x20),
            Err(RegistryError::InvalidCellSize { .. })
        ));
    }
}
