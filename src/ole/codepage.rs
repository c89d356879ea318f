//! Codepage decoding for legacy byte strings.

use encoding_rs::Encoding;

/// Decode a byte string using a Windows codepage identifier. Unknown or
/// absent codepages fall back to Windows-1252, the dominant legacy default.
pub fn decode_bytes(bytes: &[u8], codepage: Option<u16>) -> String {
    let encoding = codepage
        .and_then(codepage_to_encoding)
        .unwrap_or(encoding_rs::WINDOWS_1252);
    encoding.decode(bytes).0.into_owned()
}

/// Map a Windows codepage identifier to an `encoding_rs` encoding.
pub fn codepage_to_encoding(codepage: u16) -> Option<&'static Encoding> {
    match codepage {
        874 => Some(encoding_rs::WINDOWS_874),   // Thai
        932 => Some(encoding_rs::SHIFT_JIS),     // Japanese
        936 => Some(encoding_rs::GBK),           // Simplified Chinese
        949 => Some(encoding_rs::EUC_KR),        // Korean
        950 => Some(encoding_rs::BIG5),          // Traditional Chinese
        1250 => Some(encoding_rs::WINDOWS_1250), // Central European
        1251 => Some(encoding_rs::WINDOWS_1251), // Cyrillic
        1252 => Some(encoding_rs::WINDOWS_1252), // Western European
        1253 => Some(encoding_rs::WINDOWS_1253), // Greek
        1254 => Some(encoding_rs::WINDOWS_1254), // Turkish
        1255 => Some(encoding_rs::WINDOWS_1255), // Hebrew
        1256 => Some(encoding_rs::WINDOWS_1256), // Arabic
        1257 => Some(encoding_rs::WINDOWS_1257), // Baltic
        1258 => Some(encoding_rs::WINDOWS_1258), // Vietnamese
        10000 => Some(encoding_rs::MACINTOSH),
        65001 => Some(encoding_rs::UTF_8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_with_known_codepage() {
        // 0xE9 is é in Windows-1252.
        assert_eq!(decode_bytes(b"caf\xE9", Some(1252)), "caf\u{e9}");
    }

    #[test]
    fn unknown_codepage_falls_back() {
        assert_eq!(decode_bytes(b"plain", Some(9999)), "plain");
        assert_eq!(decode_bytes(b"plain", None), "plain");
    }
}
