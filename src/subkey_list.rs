//! Subkey list parsing (lf, lh, li, ri).
//!
//! Registry keys can have multiple subkeys, which are organized in various
//! list structures for efficient lookup. Leaf lists (lf/lh/li) point at key
//! nodes; an index root (ri) points at further lists and makes the index a
//! shallow tree.
//!
//! Parsing copies the entries out of the cell into an owned list. The index
//! walker depends on that: the cell borrow it parsed from may be invalidated
//! by the lookups it performs while descending.

use crate::error::{RegistryError, Result};
use crate::utils::read_u32_le;

/// Subkey list types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubkeyListKind {
    /// Index leaf (li) - simple list of offsets.
    IndexLeaf,

    /// Fast leaf (lf) - list with 4-byte name hints.
    FastLeaf,

    /// Hash leaf (lh) - list with name hash hints.
    HashLeaf,

    /// Index root (ri) - list of subkey list offsets.
    IndexRoot,
}

impl SubkeyListKind {
    /// Parses a subkey list kind from a 2-byte signature.
    ///
    /// An unknown signature is fatal: without it the element width cannot
    /// be determined, so the rest of the cell is uninterpretable.
    pub fn from_signature(sig: &[u8; 2], offset: u32) -> Result<Self> {
        match sig {
            b"li" => Ok(SubkeyListKind::IndexLeaf),
            b"lf" => Ok(SubkeyListKind::FastLeaf),
            b"lh" => Ok(SubkeyListKind::HashLeaf),
            b"ri" => Ok(SubkeyListKind::IndexRoot),
            _ => Err(RegistryError::InvalidSubkeyList {
                list_type: *sig,
                offset,
            }),
        }
    }

    /// Returns the on-disk width of one element in bytes.
    pub fn element_width(self) -> usize {
        match self {
            SubkeyListKind::FastLeaf | SubkeyListKind::HashLeaf => 8,
            SubkeyListKind::IndexLeaf | SubkeyListKind::IndexRoot => 4,
        }
    }

    /// Returns true if elements carry a hash next to the offset.
    pub fn has_hashes(self) -> bool {
        matches!(self, SubkeyListKind::FastLeaf | SubkeyListKind::HashLeaf)
    }

    /// Returns true if elements point at further lists instead of keys.
    pub fn is_index_root(self) -> bool {
        matches!(self, SubkeyListKind::IndexRoot)
    }
}

/// One element of a subkey list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubkeyEntry {
    /// Offset of the pointed-to cell (a key node for leaf lists, another
    /// subkey list for index roots).
    pub offset: u32,

    /// Name hint stored next to the offset: the lh name hash, or the first
    /// four name characters for lf. Zero for li/ri elements, which carry
    /// none.
    pub name_hash: u32,
}

/// Parsed subkey list with owned entries.
#[derive(Debug, Clone)]
pub struct SubkeyList {
    /// Which flavor of list this cell was.
    pub kind: SubkeyListKind,

    /// Entries in on-disk order.
    pub entries: Vec<SubkeyEntry>,
}

impl SubkeyList {
    /// Parses a subkey list from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field).
    /// * `offset` - Offset of this cell for error reporting.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown signature or when the declared element
    /// count overruns the cell.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < 4 {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: 4,
                actual: data.len(),
            });
        }

        let sig = [data[0], data[1]];
        let kind = SubkeyListKind::from_signature(&sig, offset)?;
        let count = u16::from_le_bytes([data[2], data[3]]) as usize;

        let width = kind.element_width();
        let expected_size = 4 + count * width;
        if data.len() < expected_size {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: expected_size,
                actual: data.len(),
            });
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let element_pos = 4 + i * width;
            let entry_offset = read_u32_le(data, element_pos)?;
            let name_hash = if kind.has_hashes() {
                read_u32_le(data, element_pos + 4)?
            } else {
                0
            };

            entries.push(SubkeyEntry {
                offset: entry_offset,
                name_hash,
            });
        }

        Ok(SubkeyList { kind, entries })
    }

    /// Returns the number of entries in this list.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if this list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if this is an index root (contains sublists).
    pub fn is_index_root(&self) -> bool {
        self.kind.is_index_root()
    }
}
