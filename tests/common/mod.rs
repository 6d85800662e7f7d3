//! Shared helpers for building synthetic hives in memory.
//!
//! Tests lay out cells by hand inside a single 4KiB hive bin, which keeps
//! every offset in a scenario explicit.

// Not every test binary uses every helper
#![allow(dead_code)]

use regf_reader::utils::calculate_checksum;

/// Sentinel offset meaning "no such reference".
pub const NO_OFFSET: u32 = 0xFFFF_FFFF;

/// In-memory hive: a valid base block plus one 4KiB bin.
pub struct HiveBuilder {
    data: Vec<u8>,
}

impl HiveBuilder {
    /// Creates a hive with the root key cell expected at offset 0x20.
    pub fn new() -> Self {
        let mut data = vec![0u8; 0x1000 + 0x1000];
        data[0..4].copy_from_slice(b"regf");
        data[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&1u32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        data[0x18..0x1C].copy_from_slice(&5u32.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&0x20u32.to_le_bytes());

        data[0x1000..0x1004].copy_from_slice(b"hbin");
        data[0x1008..0x100C].copy_from_slice(&0x1000u32.to_le_bytes());

        Self { data }
    }

    /// Makes the primary and secondary sequence numbers disagree.
    pub fn dirty(&mut self) -> &mut Self {
        self.data[0x04..0x08].copy_from_slice(&7u32.to_le_bytes());
        self.data[0x08..0x0C].copy_from_slice(&6u32.to_le_bytes());
        self
    }

    /// Writes an allocated cell (size field plus payload) at a cell offset.
    pub fn put_cell(&mut self, offset: u32, payload: &[u8]) -> &mut Self {
        let pos = 0x1000 + offset as usize;
        let size = -((4 + payload.len()) as i32);
        self.data[pos..pos + 4].copy_from_slice(&size.to_le_bytes());
        self.data[pos + 4..pos + 4 + payload.len()].copy_from_slice(payload);
        self
    }

    /// Finalizes the checksum and returns the hive bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        let checksum = calculate_checksum(&data);
        data[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());
        data
    }
}

/// Parameters for an nk cell with a compressed (single-byte) name.
pub struct NkSpec<'a> {
    pub name: &'a [u8],
    pub subkey_count: u32,
    pub subkey_list_offset: u32,
    pub value_count: u32,
    pub value_list_offset: u32,
    pub security_offset: u32,
    pub class_name_offset: u32,
    pub class_name_length: u16,
}

impl Default for NkSpec<'_> {
    fn default() -> Self {
        Self {
            name: b"Root",
            subkey_count: 0,
            subkey_list_offset: NO_OFFSET,
            value_count: 0,
            value_list_offset: NO_OFFSET,
            security_offset: NO_OFFSET,
            class_name_offset: NO_OFFSET,
            class_name_length: 0,
        }
    }
}

/// Builds an nk cell payload.
pub fn nk_payload(spec: &NkSpec) -> Vec<u8> {
    let mut data = vec![0u8; 0x4C + spec.name.len()];
    data[0..2].copy_from_slice(b"nk");
    // Compressed-name flag
    data[0x02..0x04].copy_from_slice(&0x0020u16.to_le_bytes());
    // An arbitrary but fixed FILETIME (2023-01-01 ballpark)
    data[0x04..0x0C].copy_from_slice(&0x01D9_1234_0000_0000u64.to_le_bytes());
    data[0x14..0x18].copy_from_slice(&spec.subkey_count.to_le_bytes());
    data[0x1C..0x20].copy_from_slice(&spec.subkey_list_offset.to_le_bytes());
    data[0x24..0x28].copy_from_slice(&spec.value_count.to_le_bytes());
    data[0x28..0x2C].copy_from_slice(&spec.value_list_offset.to_le_bytes());
    data[0x2C..0x30].copy_from_slice(&spec.security_offset.to_le_bytes());
    data[0x30..0x34].copy_from_slice(&spec.class_name_offset.to_le_bytes());
    data[0x48..0x4A].copy_from_slice(&(spec.name.len() as u16).to_le_bytes());
    data[0x4A..0x4C].copy_from_slice(&spec.class_name_length.to_le_bytes());
    data[0x4C..].copy_from_slice(spec.name);
    data
}

/// Builds an nk cell payload for a leaf key with just a name.
pub fn nk_named(name: &[u8]) -> Vec<u8> {
    nk_payload(&NkSpec {
        name,
        ..Default::default()
    })
}

/// Builds an sk cell payload around a descriptor blob.
pub fn sk_payload(descriptor: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 20 + descriptor.len()];
    data[0..2].copy_from_slice(b"sk");
    data[0x0C..0x10].copy_from_slice(&1u32.to_le_bytes());
    data[0x10..0x14].copy_from_slice(&(descriptor.len() as u32).to_le_bytes());
    data[20..].copy_from_slice(descriptor);
    data
}

/// Builds a vk cell payload with an ASCII name.
///
/// `data_length` may carry the 0x80000000 inline marker.
pub fn vk_payload(name: &[u8], data_type: u32, data_length: u32, data_offset: u32) -> Vec<u8> {
    let mut data = vec![0u8; 0x14 + name.len()];
    data[0..2].copy_from_slice(b"vk");
    data[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
    data[0x04..0x08].copy_from_slice(&data_length.to_le_bytes());
    data[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
    data[0x0C..0x10].copy_from_slice(&data_type.to_le_bytes());
    // ASCII name flag
    data[0x10..0x12].copy_from_slice(&0x0001u16.to_le_bytes());
    data[0x14..].copy_from_slice(name);
    data
}

/// Builds a vk cell holding an inline REG_DWORD.
pub fn vk_inline_dword(name: &[u8], value: u32) -> Vec<u8> {
    vk_payload(name, 4, 0x8000_0004, value)
}

/// Builds a subkey list cell (lf/lh carry hashes, li/ri do not).
pub fn subkey_list_payload(sig: &[u8; 2], entries: &[(u32, u32)]) -> Vec<u8> {
    let with_hash = sig == b"lf" || sig == b"lh";
    let mut data = vec![sig[0], sig[1]];
    data.extend((entries.len() as u16).to_le_bytes());
    for &(offset, hash) in entries {
        data.extend(offset.to_le_bytes());
        if with_hash {
            data.extend(hash.to_le_bytes());
        }
    }
    data
}

/// Builds a values-list cell from value-record offsets.
pub fn value_list_payload(offsets: &[u32]) -> Vec<u8> {
    offsets.iter().flat_map(|o| o.to_le_bytes()).collect()
}

/// Encodes a string as UTF-16LE bytes.
pub fn utf16_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}
