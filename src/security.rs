//! Security key (sk) parsing.
//!
//! Security cells form a doubly-linked list shared between keys; each cell
//! carries a reference count and an opaque security descriptor. This reader
//! does not track the reference count or follow the links: a key that
//! references an sk cell simply gets its own copy of the descriptor bytes.

use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le};

/// Size of the fixed part of a security key cell.
const SECURITY_KEY_MIN_SIZE: usize = 20;

/// Security key (sk) structure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SecurityKey {
    /// Reserved field after the signature.
    pub reserved: u16,

    /// Offset of the next security key in the list.
    pub flink: u32,

    /// Offset of the previous security key in the list.
    pub blink: u32,

    /// Number of keys referencing this descriptor.
    pub reference_count: u32,

    /// Raw security descriptor bytes (SECURITY_DESCRIPTOR_RELATIVE layout,
    /// kept opaque).
    pub descriptor: Vec<u8>,
}

impl SecurityKey {
    /// Parses a security key from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field, starting with "sk" signature).
    /// * `offset` - Offset of this cell for error reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is wrong or the descriptor overruns
    /// the cell.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < SECURITY_KEY_MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: SECURITY_KEY_MIN_SIZE,
                actual: data.len(),
            });
        }

        // Verify signature
        if &data[0..2] != b"sk" {
            return Err(RegistryError::invalid_signature(b"sk", &data[0..2]));
        }

        let reserved = read_u16_le(data, 0x02)?;
        let flink = read_u32_le(data, 0x04)?;
        let blink = read_u32_le(data, 0x08)?;
        let reference_count = read_u32_le(data, 0x0C)?;
        let descriptor_size = read_u32_le(data, 0x10)? as usize;

        let descriptor_end = SECURITY_KEY_MIN_SIZE
            .checked_add(descriptor_size)
            .ok_or(RegistryError::TruncatedData {
                offset,
                expected: usize::MAX,
                actual: data.len(),
            })?;
        if descriptor_end > data.len() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: descriptor_end,
                actual: data.len(),
            });
        }

        let descriptor = data[SECURITY_KEY_MIN_SIZE..descriptor_end].to_vec();

        Ok(SecurityKey {
            reserved,
            flink,
            blink,
            reference_count,
            descriptor,
        })
    }

    /// Consumes the security key and returns the descriptor bytes.
    pub fn into_descriptor(self) -> Vec<u8> {
        self.descriptor
    }
}
