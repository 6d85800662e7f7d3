//! Registry key node (nk) parsing and representation.

use crate::codepage::CodePage;
use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le, read_u64_le, read_utf16_string};
use tracing::debug;

/// Minimum size of a key node structure in bytes.
const KEY_NODE_MIN_SIZE: usize = 76;

/// Offset of the key name in the key node structure.
const KEY_NAME_OFFSET: usize = 0x4C;

/// Flags for key nodes.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct KeyNodeFlags(pub u16);

impl KeyNodeFlags {
    /// Key is volatile (not stored on disk).
    pub const VOLATILE: u16 = 0x0001;

    /// Key is a mount point for another hive.
    pub const HIVE_EXIT: u16 = 0x0002;

    /// Key is the root key.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key cannot be deleted.
    pub const NO_DELETE: u16 = 0x0008;

    /// Key is a symbolic link.
    pub const SYM_LINK: u16 = 0x0010;

    /// Key name is in compressed format (single-byte characters).
    pub const COMP_NAME: u16 = 0x0020;

    /// Key is a predefined handle.
    pub const PREDEF_HANDLE: u16 = 0x0040;

    /// Key is part of a virtual store.
    pub const VIRT_SOURCE: u16 = 0x0080;

    /// Key is a virtual target.
    pub const VIRT_TARGET: u16 = 0x0100;

    /// Key is part of a virtual store.
    pub const VIRT_STORE: u16 = 0x0200;

    /// Creates a new KeyNodeFlags from a u16 value.
    pub fn new(flags: u16) -> Self {
        Self(flags)
    }

    /// Returns true if the specified flag is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Returns true if the key name is compressed (single-byte characters
    /// in the hive's ANSI code page).
    pub fn is_compressed(&self) -> bool {
        self.has_flag(Self::COMP_NAME)
    }

    /// Returns true if this is a volatile key.
    pub fn is_volatile(&self) -> bool {
        self.has_flag(Self::VOLATILE)
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.has_flag(Self::ROOT_KEY)
    }
}

/// Key node (nk) structure.
///
/// Represents a registry key with metadata including name, timestamps,
/// and references to subkeys and values. The name is kept as the raw
/// on-disk bytes; decoding to a string happens on demand with a caller
/// supplied code page.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct KeyNode {
    /// Flags for this key.
    pub flags: KeyNodeFlags,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Access bits (unused).
    pub access_bits: u32,

    /// Offset to parent key node.
    pub parent_offset: u32,

    /// Number of subkeys.
    pub subkey_count: u32,

    /// Number of volatile subkeys.
    pub volatile_subkey_count: u32,

    /// Offset to subkey list.
    pub subkey_list_offset: u32,

    /// Offset to volatile subkey list.
    pub volatile_subkey_list_offset: u32,

    /// Number of values.
    pub value_count: u32,

    /// Offset to value list.
    pub value_list_offset: u32,

    /// Offset to security descriptor.
    pub security_offset: u32,

    /// Offset to class name.
    pub class_name_offset: u32,

    /// Maximum length of subkey name.
    pub max_subkey_name_len: u32,

    /// Maximum length of subkey class name.
    pub max_subkey_class_len: u32,

    /// Maximum length of value name.
    pub max_value_name_len: u32,

    /// Maximum length of value data.
    pub max_value_data_len: u32,

    /// Work variable (unused).
    pub work_var: u32,

    /// Length of key name in bytes.
    pub name_length: u16,

    /// Length of class name in bytes.
    pub class_name_length: u16,

    /// Raw key name bytes. Single-byte characters when the compressed-name
    /// flag is set, UTF-16LE otherwise.
    pub name: Vec<u8>,

    /// Hash of the key name, computed with the hash-leaf algorithm while
    /// parsing. Used as the fast path in name comparisons; the hash carried
    /// by the parent's index entry is only checked against it advisorily.
    pub name_hash: u32,
}

impl KeyNode {
    /// Parses a key node from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field, starting with "nk" signature).
    /// * `offset` - Offset of this cell for error reporting.
    /// * `name_hash` - Hash stored in the parent's index entry; 0 when the
    ///   parent index carried none (li/ri) or for the root key.
    ///
    /// When a non-zero hash is supplied it is compared against the hash of
    /// the decoded name. A mismatch is advisory only: it is logged and the
    /// decode succeeds anyway.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or truncated.
    pub fn parse(data: &[u8], offset: u32, name_hash: u32) -> Result<Self> {
        if data.len() < KEY_NODE_MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: KEY_NODE_MIN_SIZE,
                actual: data.len(),
            });
        }

        // Verify signature
        if &data[0..2] != b"nk" {
            return Err(RegistryError::invalid_signature(b"nk", &data[0..2]));
        }

        let flags = KeyNodeFlags::new(read_u16_le(data, 0x02)?);
        let last_written = read_u64_le(data, 0x04)?;
        let access_bits = read_u32_le(data, 0x0C)?;
        let parent_offset = read_u32_le(data, 0x10)?;
        let subkey_count = read_u32_le(data, 0x14)?;
        let volatile_subkey_count = read_u32_le(data, 0x18)?;
        let subkey_list_offset = read_u32_le(data, 0x1C)?;
        let volatile_subkey_list_offset = read_u32_le(data, 0x20)?;
        let value_count = read_u32_le(data, 0x24)?;
        let value_list_offset = read_u32_le(data, 0x28)?;
        let security_offset = read_u32_le(data, 0x2C)?;
        let class_name_offset = read_u32_le(data, 0x30)?;

        let max_subkey_name_len = read_u32_le(data, 0x34)?;
        let max_subkey_class_len = read_u32_le(data, 0x38)?;
        let max_value_name_len = read_u32_le(data, 0x3C)?;
        let max_value_data_len = read_u32_le(data, 0x40)?;
        let work_var = read_u32_le(data, 0x44)?;

        let name_length = read_u16_le(data, 0x48)?;
        let class_name_length = read_u16_le(data, 0x4A)?;

        // Key name follows the fixed header
        let name = if name_length > 0 {
            let name_end = KEY_NAME_OFFSET + name_length as usize;
            if name_end > data.len() {
                return Err(RegistryError::TruncatedData {
                    offset,
                    expected: name_end,
                    actual: data.len(),
                });
            }

            data[KEY_NAME_OFFSET..name_end].to_vec()
        } else {
            Vec::new()
        };

        let computed_hash = hash_name_bytes(&name, flags.is_compressed());
        if name_hash != 0 && computed_hash != name_hash {
            // Expected for fast-leaf parents, whose entries carry the first
            // four name characters instead of a hash
            debug!(
                offset = %format!("{:#x}", offset),
                stored = %format!("{:#x}", name_hash),
                computed = %format!("{:#x}", computed_hash),
                "Index entry hash does not match key name"
            );
        }

        Ok(KeyNode {
            flags,
            last_written,
            access_bits,
            parent_offset,
            subkey_count,
            volatile_subkey_count,
            subkey_list_offset,
            volatile_subkey_list_offset,
            value_count,
            value_list_offset,
            security_offset,
            class_name_offset,
            max_subkey_name_len,
            max_subkey_class_len,
            max_value_name_len,
            max_value_data_len,
            work_var,
            name_length,
            class_name_length,
            name,
            name_hash: computed_hash,
        })
    }

    /// Returns true if this key has subkeys.
    pub fn has_subkeys(&self) -> bool {
        self.subkey_count > 0
    }

    /// Returns true if this key has values.
    pub fn has_values(&self) -> bool {
        self.value_count > 0
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.flags.is_root()
    }

    /// Decodes the key name to a string.
    ///
    /// Compressed names are decoded with `codepage`; uncompressed names are
    /// UTF-16LE regardless of the code page.
    pub fn name_utf8(&self, codepage: CodePage) -> Result<String> {
        if self.flags.is_compressed() {
            Ok(codepage.decode(&self.name))
        } else {
            read_utf16_string(&self.name, 0)
        }
    }

    /// Returns the key name as UTF-16 code units.
    pub fn name_utf16(&self, codepage: CodePage) -> Result<Vec<u16>> {
        if self.flags.is_compressed() {
            Ok(codepage.decode(&self.name).encode_utf16().collect())
        } else {
            Ok(read_utf16_string(&self.name, 0)?.encode_utf16().collect())
        }
    }
}

/// Computes the 32-bit name hash stored in hash-leaf (lh) index entries.
///
/// The algorithm hashes the ASCII-uppercased UTF-16 code units of the name:
/// `hash = hash * 37 + unit`.
pub fn name_hash(name: &str) -> u32 {
    let mut hash: u32 = 0;
    for unit in name.encode_utf16() {
        hash = hash
            .wrapping_mul(37)
            .wrapping_add(u32::from(ascii_upper_unit(unit)));
    }
    hash
}

/// Hashes raw on-disk name bytes without decoding to a string first.
pub(crate) fn hash_name_bytes(name: &[u8], compressed: bool) -> u32 {
    let mut hash: u32 = 0;
    if compressed {
        for &b in name {
            hash = hash
                .wrapping_mul(37)
                .wrapping_add(u32::from(ascii_upper_unit(u16::from(b))));
        }
    } else {
        for pair in name.chunks_exact(2) {
            let unit = u16::from_le_bytes([pair[0], pair[1]]);
            hash = hash
                .wrapping_mul(37)
                .wrapping_add(u32::from(ascii_upper_unit(unit)));
        }
    }
    hash
}

/// ASCII-only uppercasing of a UTF-16 code unit (registry case folding).
fn ascii_upper_unit(unit: u16) -> u16 {
    if (b'a' as u16..=b'z' as u16).contains(&unit) {
        unit - 0x20
    } else {
        unit
    }
}
