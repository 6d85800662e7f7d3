//! Windows code page handling for single-byte key and value names.
//!
//! Key names with the "compressed name" flag are stored as single-byte
//! characters in the ANSI code page of the system that wrote the hive.
//! The hive itself does not record which code page that was, so callers
//! pick one (Windows-1252 covers the overwhelming majority of hives).

use crate::error::{RegistryError, Result};
use encoding_rs::Encoding;

/// A Windows code page used to decode compressed (single-byte) names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePage {
    id: u16,
    encoding: &'static Encoding,
}

impl CodePage {
    /// Looks up a code page by its Windows identifier.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnsupportedCodePage` for identifiers with no
    /// supported encoding.
    pub fn from_windows(id: u16) -> Result<Self> {
        let encoding = match id {
            874 => encoding_rs::WINDOWS_874,
            932 => encoding_rs::SHIFT_JIS,
            936 => encoding_rs::GBK,
            949 => encoding_rs::EUC_KR,
            950 => encoding_rs::BIG5,
            1250 => encoding_rs::WINDOWS_1250,
            1251 => encoding_rs::WINDOWS_1251,
            1252 => encoding_rs::WINDOWS_1252,
            1253 => encoding_rs::WINDOWS_1253,
            1254 => encoding_rs::WINDOWS_1254,
            1255 => encoding_rs::WINDOWS_1255,
            1256 => encoding_rs::WINDOWS_1256,
            1257 => encoding_rs::WINDOWS_1257,
            1258 => encoding_rs::WINDOWS_1258,
            65001 => encoding_rs::UTF_8,
            _ => return Err(RegistryError::UnsupportedCodePage(id)),
        };

        Ok(Self { id, encoding })
    }

    /// Returns the Windows identifier of this code page.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Decodes name bytes with this code page, trimming trailing nulls.
    ///
    /// Decoding is lossy: bytes without a mapping become the replacement
    /// character rather than failing the whole name.
    pub fn decode(&self, data: &[u8]) -> String {
        let (decoded, _encoding, _had_errors) = self.encoding.decode(data);
        decoded.trim_end_matches('\0').to_string()
    }
}

impl Default for CodePage {
    /// Windows-1252, the code page of most hives in the wild.
    fn default() -> Self {
        Self {
            id: 1252,
            encoding: encoding_rs::WINDOWS_1252,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_1252() {
        assert_eq!(CodePage::default().id(), 1252);
        assert_eq!(CodePage::from_windows(1252).unwrap(), CodePage::default());
    }

    #[test]
    fn test_unsupported_id() {
        let result = CodePage::from_windows(437);
        assert!(matches!(
            result,
            Err(RegistryError::UnsupportedCodePage(437))
        ));
    }

    #[test]
    fn test_decode_high_bytes() {
        // 0xE9 is 'é' in Windows-1252 but 'щ' in Windows-1251
        let cp1252 = CodePage::from_windows(1252).unwrap();
        let cp1251 = CodePage::from_windows(1251).unwrap();
        assert_eq!(cp1252.decode(&[0x43, 0x61, 0x66, 0xE9]), "Café");
        assert_eq!(cp1251.decode(&[0xE9]), "й");
    }

    #[test]
    fn test_decode_trims_trailing_nulls() {
        let cp = CodePage::default();
        assert_eq!(cp.decode(b"Setup\0\0"), "Setup");
    }
}
