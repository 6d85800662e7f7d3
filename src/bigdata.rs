//! Big data block (db) parsing.
//!
//! Values too large for one cell are split across segment cells. The db
//! cell itself holds nothing but a segment count and a pointer to the
//! segment offset list; reassembly walks that list and concatenates the
//! segments back into the declared length.

use crate::cell_source::CellSource;
use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le};
use tracing::debug;

/// Maximum value size stored directly in a single cell; anything larger
/// goes through a big data block.
pub const MAX_DIRECT_DATA_SIZE: u32 = 16344;

/// Length of the fixed db cell payload.
const BIG_DATA_HEADER_SIZE: usize = 8;

/// Segment-list entries carry this marker in their high bit.
const SEGMENT_OFFSET_MASK: u32 = 0x7FFF_FFFF;

/// Header of a big-data (db) cell.
#[derive(Debug, Clone)]
pub struct BigDataBlock {
    /// How many segment cells hold the value bytes.
    pub segment_count: u16,

    /// Cell offset of the segment offset list.
    pub segment_list_offset: u32,
}

impl BigDataBlock {
    /// Decodes a db cell payload.
    ///
    /// # Errors
    ///
    /// Fails on a wrong signature or a payload shorter than the fixed
    /// header.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < BIG_DATA_HEADER_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: BIG_DATA_HEADER_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..2] != b"db" {
            return Err(RegistryError::invalid_signature(b"db", &data[0..2]));
        }

        Ok(BigDataBlock {
            segment_count: read_u16_le(data, 0x02)?,
            segment_list_offset: read_u32_le(data, 0x04)?,
        })
    }
}

/// Reads and reassembles a big data value.
///
/// Fetches the db header, then its segment list, then every segment in
/// list order, stopping once `expected_length` bytes have been collected.
///
/// # Arguments
///
/// * `source` - Cell source to read header, list, and segments from
/// * `offset` - Cell offset of the big data block header
/// * `expected_length` - Expected total length of the data
///
/// # Errors
///
/// Returns an error if the big data structure is corrupted or segments are
/// missing.
pub fn assemble_big_data(
    source: &CellSource,
    offset: u32,
    expected_length: u32,
) -> Result<Vec<u8>> {
    debug!(
        offset = %format!("{:#x}", offset),
        expected_length,
        "Reading big data block"
    );

    let header_cell = source.get(offset)?;
    let db_header = BigDataBlock::parse(header_cell.data, offset)?;

    let segment_list_cell = source.get(db_header.segment_list_offset)?;

    let expected_list_size = db_header.segment_count as usize * 4;
    if segment_list_cell.size() < expected_list_size {
        return Err(RegistryError::TruncatedData {
            offset: db_header.segment_list_offset,
            expected: expected_list_size,
            actual: segment_list_cell.size(),
        });
    }

    let mut segment_offsets = Vec::with_capacity(db_header.segment_count as usize);
    for i in 0..db_header.segment_count as usize {
        let entry = read_u32_le(segment_list_cell.data, i * 4)?;
        segment_offsets.push(entry & SEGMENT_OFFSET_MASK);
    }

    let mut data = Vec::with_capacity(expected_length as usize);
    for segment_offset in segment_offsets {
        let segment = source.get(segment_offset)?;
        data.extend_from_slice(segment.data);

        if data.len() >= expected_length as usize {
            break;
        }
    }

    // Segments may carry trailing padding past the declared length
    data.truncate(expected_length as usize);

    Ok(data)
}
