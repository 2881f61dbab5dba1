//! Compact identifier codec
//!
//! IFC stores entity GUIDs as 22 symbols of a 64-symbol alphabet
//! (`0-9`, `A-Z`, `a-z`, `_`, `$`). Each symbol carries 6 bits, most
//! significant first; 22 × 6 = 132 bits, so the leading symbol only
//! contributes its low 2 bits to the 128-bit value.
//!
//! The canonical form is the lowercase `8-4-4-4-12` hex rendering.

use thiserror::Error;
use uuid::Uuid;

/// Length of a compact identifier.
pub const COMPACT_LEN: usize = 22;

const ALPHABET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_$";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("invalid compact identifier `{input}`: expected {COMPACT_LEN} symbols, got {len}")]
    Length { input: String, len: usize },

    #[error("invalid compact identifier `{input}`: symbol {symbol:?} at position {position} is outside the alphabet")]
    Symbol {
        input: String,
        symbol: char,
        position: usize,
    },

    #[error("invalid canonical identifier `{0}`")]
    Canonical(String),
}

fn symbol_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'Z' => Some(byte - b'A' + 10),
        b'a'..=b'z' => Some(byte - b'a' + 36),
        b'_' => Some(62),
        b'$' => Some(63),
        _ => None,
    }
}

/// Encode a 128-bit value as a 22-symbol compact identifier.
pub fn encode_compact(value: u128) -> String {
    let mut out = [0u8; COMPACT_LEN];
    let mut rest = value;
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(rest & 0x3f) as usize];
        rest >>= 6;
    }
    // Every byte comes from ALPHABET, which is ASCII.
    out.iter().map(|&b| b as char).collect()
}

/// Decode a 22-symbol compact identifier into its 128-bit value.
///
/// Bits shifted past the top of the 128-bit accumulator are discarded, so a
/// leading symbol above `3` is accepted and truncated.
pub fn decode_compact(input: &str) -> Result<u128, IdentifierError> {
    let len = input.chars().count();
    if len != COMPACT_LEN {
        return Err(IdentifierError::Length {
            input: input.to_string(),
            len,
        });
    }

    let mut value: u128 = 0;
    for (position, ch) in input.chars().enumerate() {
        let digit = u8::try_from(ch)
            .ok()
            .and_then(symbol_value)
            .ok_or_else(|| IdentifierError::Symbol {
                input: input.to_string(),
                symbol: ch,
                position,
            })?;
        value = (value << 6) | u128::from(digit);
    }
    Ok(value)
}

/// Render a 128-bit value as a lowercase `8-4-4-4-12` GUID.
pub fn format_guid(value: u128) -> String {
    Uuid::from_u128(value).hyphenated().to_string()
}

/// Parse a canonical GUID (hyphenated or simple hex) into its 128-bit value.
pub fn parse_guid(input: &str) -> Result<u128, IdentifierError> {
    Uuid::parse_str(input.trim())
        .map(|uuid| uuid.as_u128())
        .map_err(|_| IdentifierError::Canonical(input.to_string()))
}

/// Compact IFC `GlobalId` → canonical GUID string.
pub fn global_id_to_guid(global_id: &str) -> Result<String, IdentifierError> {
    decode_compact(global_id).map(format_guid)
}

/// Canonical GUID string → compact IFC `GlobalId`.
pub fn guid_to_global_id(guid: &str) -> Result<String, IdentifierError> {
    parse_guid(guid).map(encode_compact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_global_id() {
        // All-zero and all-one values pin the bit layout.
        assert_eq!(encode_compact(0), "0000000000000000000000");
        assert_eq!(encode_compact(u128::MAX), "3$$$$$$$$$$$$$$$$$$$$$");
        assert_eq!(
            global_id_to_guid("3$$$$$$$$$$$$$$$$$$$$$").unwrap(),
            "ffffffff-ffff-ffff-ffff-ffffffffffff"
        );
    }

    #[test]
    fn test_guid_formatting_is_lowercase_8_4_4_4_12() {
        let guid = format_guid(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        assert_eq!(guid, "01234567-89ab-cdef-0123-456789abcdef");
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(matches!(
            decode_compact("abc"),
            Err(IdentifierError::Length { len: 3, .. })
        ));
        assert!(matches!(
            decode_compact("00000000000000000000000"),
            Err(IdentifierError::Length { len: 23, .. })
        ));
        assert!(decode_compact("").is_err());
    }

    #[test]
    fn test_rejects_symbol_outside_alphabet() {
        let err = decode_compact("0000000000000000000-00").unwrap_err();
        assert!(matches!(
            err,
            IdentifierError::Symbol {
                symbol: '-',
                position: 19,
                ..
            }
        ));
        // Non-ASCII input of the right char count is still rejected.
        assert!(decode_compact("000000000000000000000é").is_err());
    }

    #[test]
    fn test_canonical_roundtrip() {
        let compact = "1hOSvn6df7F8_7GcBWlR72";
        let guid = global_id_to_guid(compact).unwrap();
        assert_eq!(guid_to_global_id(&guid).unwrap(), compact);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        #[test]
        fn compact_roundtrip(value in any::<u128>()) {
            let compact = encode_compact(value);
            prop_assert_eq!(compact.len(), COMPACT_LEN);
            prop_assert_eq!(decode_compact(&compact).unwrap(), value);
        }

        #[test]
        fn formatting_is_deterministic(value in any::<u128>()) {
            let compact = encode_compact(value);
            let a = global_id_to_guid(&compact).unwrap();
            let b = global_id_to_guid(&compact).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
