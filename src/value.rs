//! Registry value (vk) parsing and data extraction.

use crate::error::{RegistryError, Result};
use crate::utils::{read_ascii_string, read_u16_le, read_u32_le, read_u64_le, read_utf16_string};
use byteorder::{BigEndian, ByteOrder};
use std::fmt;

/// Fixed header length of a vk cell; the name follows immediately after.
const VALUE_KEY_HEADER_SIZE: usize = 0x14;

/// Marker bit in the data-size field: the value bytes live in the offset
/// field itself instead of a separate cell.
const DATA_IN_OFFSET: u32 = 0x8000_0000;

/// Name-encoding bit in the vk flags: single-byte characters.
const VALUE_NAME_ASCII: u16 = 0x0001;

/// Registry value data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueType {
    /// No value type.
    None,

    /// String (null-terminated).
    String,

    /// String with environment variables.
    ExpandString,

    /// Binary data.
    Binary,

    /// 32-bit little-endian integer.
    Dword,

    /// 32-bit big-endian integer.
    DwordBigEndian,

    /// Symbolic link (Unicode).
    Link,

    /// Multiple strings.
    MultiString,

    /// Resource list.
    ResourceList,

    /// Full resource descriptor.
    FullResourceDescriptor,

    /// Resource requirements list.
    ResourceRequirementsList,

    /// 64-bit little-endian integer.
    Qword,

    /// Unknown or non-standard value type.
    /// Contains the raw type value.
    Unknown(u32),
}

impl ValueType {
    /// Parses a value type from a u32.
    ///
    /// Value types 0-11 are predefined, but other values are allowed as
    /// well. Unknown types are returned as `ValueType::Unknown`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::Dword,
            5 => ValueType::DwordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            8 => ValueType::ResourceList,
            9 => ValueType::FullResourceDescriptor,
            10 => ValueType::ResourceRequirementsList,
            11 => ValueType::Qword,
            _ => ValueType::Unknown(value),
        }
    }
}

impl fmt::Display for ValueType {
    /// Formats as the conventional REG_* constant name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::None => "REG_NONE",
            ValueType::String => "REG_SZ",
            ValueType::ExpandString => "REG_EXPAND_SZ",
            ValueType::Binary => "REG_BINARY",
            ValueType::Dword => "REG_DWORD",
            ValueType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN",
            ValueType::Link => "REG_LINK",
            ValueType::MultiString => "REG_MULTI_SZ",
            ValueType::ResourceList => "REG_RESOURCE_LIST",
            ValueType::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR",
            ValueType::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST",
            ValueType::Qword => "REG_QWORD",
            ValueType::Unknown(value) => return write!(f, "REG_UNKNOWN_{:#010x}", value),
        };
        f.write_str(name)
    }
}

/// Value key (vk) structure.
///
/// Carries the value's name, declared type, and where its data lives.
/// Sizes of four bytes or less are packed straight into the offset field;
/// anything bigger sits in its own cell (or a big-data block).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ValueKey {
    /// Length in bytes of the stored name (0 for the default value).
    pub name_length: u16,

    /// Data size in bytes, with the in-offset marker bit cleared.
    pub data_length: u32,

    /// Cell offset of the data, or the data itself when packed inline.
    pub data_offset: u32,

    /// Declared data type.
    pub data_type: ValueType,

    /// Name encoding and padding flags.
    pub flags: u16,

    /// Decoded value name; "(default)" for the unnamed value.
    pub name: String,
}

impl ValueKey {
    /// Parses a value key from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field, starting with "vk" signature).
    /// * `offset` - Offset of this cell for error reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is wrong or the name overruns
    /// the cell.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < VALUE_KEY_HEADER_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: VALUE_KEY_HEADER_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..2] != b"vk" {
            return Err(RegistryError::invalid_signature(b"vk", &data[0..2]));
        }

        let name_length = read_u16_le(data, 0x02)?;
        let raw_size = read_u32_le(data, 0x04)?;
        let data_offset = read_u32_le(data, 0x08)?;
        let data_type = ValueType::from_u32(read_u32_le(data, 0x0C)?);
        let flags = read_u16_le(data, 0x10)?;

        let name_end = VALUE_KEY_HEADER_SIZE + name_length as usize;
        if name_end > data.len() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: name_end,
                actual: data.len(),
            });
        }
        let name_bytes = &data[VALUE_KEY_HEADER_SIZE..name_end];

        let name = if name_bytes.is_empty() {
            // The unnamed vk is the key's default value
            String::from("(default)")
        } else if flags & VALUE_NAME_ASCII != 0 {
            read_ascii_string(name_bytes)
        } else {
            read_utf16_string(name_bytes, offset)?
        };

        Ok(ValueKey {
            name_length,
            data_length: raw_size & !DATA_IN_OFFSET,
            data_offset,
            data_type,
            flags,
            name,
        })
    }

    /// Returns true if the value bytes are packed into the offset field
    /// instead of a separate cell.
    pub fn is_inline_data(&self) -> bool {
        (1..=4).contains(&self.data_length)
    }

    /// Unpacks the bytes of an inline value.
    pub fn inline_data(&self) -> Vec<u8> {
        self.data_offset.to_le_bytes()[..self.data_length as usize].to_vec()
    }
}

/// Parsed registry value data.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueData {
    /// No data.
    None,

    /// String value.
    String(String),

    /// Expandable string value.
    ExpandString(String),

    /// Binary data.
    Binary(Vec<u8>),

    /// 32-bit integer.
    Dword(u32),

    /// 32-bit big-endian integer.
    DwordBigEndian(u32),

    /// Multiple strings.
    MultiString(Vec<String>),

    /// 64-bit integer.
    Qword(u64),

    /// Unknown or unsupported type.
    Unknown(Vec<u8>),
}

impl ValueData {
    /// Decodes raw value bytes according to the declared type.
    ///
    /// Types this reader has no decoder for keep their raw bytes in
    /// `ValueData::Unknown` rather than failing.
    ///
    /// # Arguments
    ///
    /// * `data` - Raw value data bytes.
    /// * `value_type` - Type of the value.
    /// * `offset` - Offset for error reporting.
    pub fn parse(data: &[u8], value_type: ValueType, offset: u32) -> Result<Self> {
        if data.is_empty() {
            return Ok(ValueData::None);
        }

        let decoded = match value_type {
            ValueType::None => ValueData::None,

            ValueType::String => ValueData::String(read_utf16_string(data, offset)?),
            ValueType::ExpandString => ValueData::ExpandString(read_utf16_string(data, offset)?),

            ValueType::Dword => ValueData::Dword(read_u32_le(data, 0)?),

            ValueType::DwordBigEndian => {
                if data.len() < 4 {
                    return Err(RegistryError::TruncatedData {
                        offset,
                        expected: 4,
                        actual: data.len(),
                    });
                }
                ValueData::DwordBigEndian(BigEndian::read_u32(data))
            }

            ValueType::Qword => ValueData::Qword(read_u64_le(data, 0)?),

            ValueType::MultiString => {
                // One UTF-16 blob: null-terminated strings, double null at
                // the end
                let joined = read_utf16_string(data, offset)?;
                ValueData::MultiString(
                    joined
                        .split('\0')
                        .filter(|part| !part.is_empty())
                        .map(str::to_owned)
                        .collect(),
                )
            }

            ValueType::Binary => ValueData::Binary(data.to_vec()),

            _ => ValueData::Unknown(data.to_vec()),
        };

        Ok(decoded)
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::None => f.write_str("(none)"),
            ValueData::String(s) | ValueData::ExpandString(s) => f.write_str(s),
            ValueData::Binary(bytes) | ValueData::Unknown(bytes) => {
                write!(f, "{:02X?}", bytes)
            }
            ValueData::Dword(value) | ValueData::DwordBigEndian(value) => {
                write!(f, "{} (0x{:08X})", value, value)
            }
            ValueData::Qword(value) => write!(f, "{} (0x{:016X})", value, value),
            ValueData::MultiString(strings) => f.write_str(&strings.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vk_bytes(name: &[u8], raw_size: u32, data_offset: u32, data_type: u32, flags: u16) -> Vec<u8> {
        let mut data = vec![0u8; VALUE_KEY_HEADER_SIZE + name.len()];
        data[0..2].copy_from_slice(b"vk");
        data[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data[0x04..0x08].copy_from_slice(&raw_size.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
        data[0x0C..0x10].copy_from_slice(&data_type.to_le_bytes());
        data[0x10..0x12].copy_from_slice(&flags.to_le_bytes());
        data[VALUE_KEY_HEADER_SIZE..].copy_from_slice(name);
        data
    }

    #[test]
    fn test_header_shorter_than_fixed_part() {
        let data = vk_bytes(b"", 0, 0, 0, 0);
        assert!(matches!(
            ValueKey::parse(&data[..VALUE_KEY_HEADER_SIZE - 1], 0),
            Err(RegistryError::TruncatedData { .. })
        ));
    }

    #[test]
    fn test_wrong_signature() {
        let mut data = vk_bytes(b"Name", 0, 0, 1, VALUE_NAME_ASCII);
        data[0..2].copy_from_slice(b"nk");
        assert!(matches!(
            ValueKey::parse(&data, 0),
            Err(RegistryError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_name_overruns_cell() {
        let mut data = vk_bytes(b"Path", 0, 0, 1, VALUE_NAME_ASCII);
        data[0x02..0x04].copy_from_slice(&100u16.to_le_bytes());
        assert!(matches!(
            ValueKey::parse(&data, 0),
            Err(RegistryError::TruncatedData { .. })
        ));
    }

    #[test]
    fn test_unnamed_value_is_default() {
        let vk = ValueKey::parse(&vk_bytes(b"", 0, 0, 1, 0), 0).unwrap();
        assert_eq!(vk.name, "(default)");
        assert_eq!(vk.name_length, 0);
    }

    #[test]
    fn test_utf16_value_name() {
        let name: Vec<u8> = "Größe".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let vk = ValueKey::parse(&vk_bytes(&name, 0, 0, 3, 0), 0).unwrap();
        assert_eq!(vk.name, "Größe");
        assert_eq!(vk.data_type, ValueType::Binary);
    }

    #[test]
    fn test_inline_marker_bit_is_stripped() {
        let vk = ValueKey::parse(
            &vk_bytes(b"Start", 0x8000_0004, 0xDDCCBBAA, 4, VALUE_NAME_ASCII),
            0,
        )
        .unwrap();
        assert_eq!(vk.data_length, 4);
        assert!(vk.is_inline_data());
        assert_eq!(vk.inline_data(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn test_out_of_line_data_is_not_inline() {
        let vk = ValueKey::parse(&vk_bytes(b"Big", 0x200, 0x480, 3, VALUE_NAME_ASCII), 0).unwrap();
        assert!(!vk.is_inline_data());
        assert_eq!(vk.data_offset, 0x480);
    }

    #[test]
    fn test_value_data_integers() {
        let dword = ValueData::parse(&[0x78, 0x56, 0x34, 0x12], ValueType::Dword, 0).unwrap();
        assert!(matches!(dword, ValueData::Dword(0x12345678)));

        let be = ValueData::parse(&[0x12, 0x34, 0x56, 0x78], ValueType::DwordBigEndian, 0).unwrap();
        assert!(matches!(be, ValueData::DwordBigEndian(0x12345678)));

        let qword = ValueData::parse(&0x1122_3344_5566_7788u64.to_le_bytes(), ValueType::Qword, 0)
            .unwrap();
        assert!(matches!(qword, ValueData::Qword(0x1122_3344_5566_7788)));

        // Too few bytes for the declared integer width
        assert!(ValueData::parse(&[0x01, 0x02], ValueType::Dword, 0).is_err());
        assert!(ValueData::parse(&[0x01, 0x02], ValueType::DwordBigEndian, 0).is_err());
    }

    #[test]
    fn test_value_data_multi_string() {
        let raw: Vec<u8> = "one\0two\0\0"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        match ValueData::parse(&raw, ValueType::MultiString, 0).unwrap() {
            ValueData::MultiString(strings) => assert_eq!(strings, vec!["one", "two"]),
            other => panic!("expected MultiString, got {}", other),
        }
    }

    #[test]
    fn test_unknown_type_keeps_raw_bytes() {
        let data = ValueData::parse(&[0xDE, 0xAD], ValueType::Unknown(0x42), 0).unwrap();
        assert!(matches!(data, ValueData::Unknown(ref b) if b == &[0xDE, 0xAD]));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(ValueType::String.to_string(), "REG_SZ");
        assert_eq!(ValueType::Qword.to_string(), "REG_QWORD");
        assert_eq!(ValueType::Unknown(0x42).to_string(), "REG_UNKNOWN_0x00000042");

        assert_eq!(ValueData::None.to_string(), "(none)");
        assert_eq!(ValueData::String("abc".into()).to_string(), "abc");
        assert_eq!(ValueData::Dword(7).to_string(), "7 (0x00000007)");
        assert_eq!(
            ValueData::MultiString(vec!["a".into(), "b".into()]).to_string(),
            "a, b"
        );
    }
}
