//! Text encodings for string, delimited string and magic fields.

use std::fmt;

/// Character encoding used to turn bytes into text and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TextEncoding {
    /// 7-bit ASCII. Every byte must be in 0..=0x7F.
    #[default]
    Ascii,
    /// UTF-8. Any valid UTF-8 byte sequence is accepted.
    Utf8,
    /// ISO-8859-1: every byte is one code point.
    Latin1,
    /// UTF-16, little endian code units.
    Utf16Le,
    /// Lowercase hexadecimal digit pairs, one pair per byte.
    Hex,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextEncoding::Ascii => "ASCII",
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Latin1 => "Latin-1",
            TextEncoding::Utf16Le => "UTF-16LE",
            TextEncoding::Hex => "hex",
        })
    }
}

impl TextEncoding {
    /// Decodes `bytes`. Returns `None` if they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Ascii => {
                if bytes.iter().any(|b| *b > 0x7F) {
                    return None;
                }
                String::from_utf8(bytes.to_vec()).ok()
            }
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            TextEncoding::Latin1 => Some(bytes.iter().map(|b| char::from(*b)).collect()),
            TextEncoding::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return None;
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units).ok()
            }
            TextEncoding::Hex => {
                let mut out = String::with_capacity(bytes.len() * 2);
                for b in bytes {
                    out.push(hex_digit(b >> 4));
                    out.push(hex_digit(b & 0x0F));
                }
                Some(out)
            }
        }
    }

    /// Encodes `text`. Returns `None` if it cannot be represented.
    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self {
            TextEncoding::Ascii => text.is_ascii().then(|| text.as_bytes().to_vec()),
            TextEncoding::Utf8 => Some(text.as_bytes().to_vec()),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).ok())
                .collect(),
            TextEncoding::Utf16Le => Some(
                text.encode_utf16()
                    .flat_map(|unit| unit.to_le_bytes())
                    .collect(),
            ),
            TextEncoding::Hex => {
                let digits = text.as_bytes();
                if digits.len() % 2 != 0 {
                    return None;
                }
                digits
                    .chunks_exact(2)
                    .map(|pair| Some((hex_value(pair[0])? << 4) | hex_value(pair[1])?))
                    .collect()
            }
        }
    }
}

fn hex_digit(nibble: u8) -> char {
    char::from(b"0123456789abcdef"[usize::from(nibble & 0x0F)])
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Cuts `bytes` at the first zero byte, if any.
pub(crate) fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|b| *b == 0) {
        Some(pos) => &bytes[..pos],
        None => bytes,
    }
}
