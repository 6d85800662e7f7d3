//! Error types for registry parsing operations.
//!
//! Fatal conditions (bad signatures, truncated cells, invalid arguments)
//! are reported as [`RegistryError`]. Damaged references that the reader
//! can tolerate are not errors at all: traversal reports them as
//! [`Health::Corrupted`] and keeps going.

use std::io;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registry parsing.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error occurred while reading the hive file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid magic signature in header or structure.
    #[error("Invalid signature: expected {expected:?}, found {found:?}")]
    InvalidSignature {
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    /// Invalid hive format or corrupted data.
    #[error("Invalid hive format: {0}")]
    InvalidFormat(String),

    /// Cell offset is not inside any known hive bin.
    #[error("Invalid cell offset: {offset:#x} (hive size: {hive_size:#x})")]
    InvalidOffset {
        offset: u32,
        hive_size: usize,
    },

    /// Cell size is invalid or corrupted.
    #[error("Invalid cell size: {size} at offset {offset:#x}")]
    InvalidCellSize {
        size: i32,
        offset: u32,
    },

    /// Key or value not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid UTF-16 string data.
    #[error("Invalid UTF-16 string at offset {offset:#x}")]
    InvalidUtf16 {
        offset: u32,
    },

    /// Hive is too small to be valid.
    #[error("Hive too small: {size} bytes (minimum: {minimum} bytes)")]
    HiveTooSmall {
        size: usize,
        minimum: usize,
    },

    /// Checksum mismatch in hive header.
    #[error("Checksum mismatch: expected {expected:#x}, calculated {calculated:#x}")]
    ChecksumMismatch {
        expected: u32,
        calculated: u32,
    },

    /// Unsupported hive version.
    #[error("Unsupported hive version: {major}.{minor}")]
    UnsupportedVersion {
        major: u32,
        minor: u32,
    },

    /// Data truncated or incomplete.
    #[error("Truncated data at offset {offset:#x}: expected {expected} bytes, got {actual} bytes")]
    TruncatedData {
        offset: u32,
        expected: usize,
        actual: usize,
    },

    /// Unknown sub-key index signature. Fatal: without the signature the
    /// element width cannot be determined, so the cell cannot be walked.
    #[error("Invalid subkey list type: {list_type:?} at offset {offset:#x}")]
    InvalidSubkeyList {
        list_type: [u8; 2],
        offset: u32,
    },

    /// Windows code page with no supported encoding.
    #[error("Unsupported code page: {0}")]
    UnsupportedCodePage(u16),

    /// A one-shot initialization was attempted twice.
    #[error("Already initialized: {what}")]
    AlreadyInitialized {
        what: &'static str,
    },
}

impl RegistryError {
    /// Creates an invalid signature error with context.
    ///
    /// # Arguments
    ///
    /// * `expected` - Expected signature bytes
    /// * `found` - Actual signature bytes found
    pub fn invalid_signature(expected: &[u8], found: &[u8]) -> Self {
        Self::InvalidSignature {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    /// Creates an invalid offset error with context.
    pub fn invalid_offset(offset: u32, hive_size: usize) -> Self {
        Self::InvalidOffset { offset, hive_size }
    }

    /// Creates an invalid cell size error with context.
    pub fn invalid_cell_size(size: i32, offset: u32) -> Self {
        Self::InvalidCellSize { size, offset }
    }

    /// Creates a not found error with context about what was being searched.
    ///
    /// # Arguments
    ///
    /// * `item_type` - Type of item (e.g., "key", "value")
    /// * `name` - Name of the item that wasn't found
    pub fn not_found(item_type: &str, name: &str) -> Self {
        Self::NotFound(format!("{} '{}'", item_type, name))
    }
}

/// Outcome of an operation that tolerates damaged references.
///
/// A `Corrupted` result is still a success at the API level: the structures
/// that could be read were read, and the entries behind out-of-range offsets
/// were dropped. Once a key item observes `Corrupted` it never reverts to
/// `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Health {
    /// Every referenced offset resolved to a known hive bin.
    #[default]
    Ok,

    /// At least one referenced offset was out of range; the affected
    /// entries were skipped.
    Corrupted,
}

impl Health {
    /// Returns true if corruption was observed.
    pub fn is_corrupted(self) -> bool {
        matches!(self, Health::Corrupted)
    }

    /// Combines two outcomes; corruption is sticky.
    pub fn merge(self, other: Health) -> Health {
        if self.is_corrupted() || other.is_corrupted() {
            Health::Corrupted
        } else {
            Health::Ok
        }
    }
}
