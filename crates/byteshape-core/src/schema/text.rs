//! Byte-sequence ↔ text conversions backing the string field constructors.
//!
//! Decoding is deliberately lossy (replacement characters) to match the
//! usual non-fatal text-decoder behaviour; encoding is exact. BOM handling
//! is disabled so a decode/encode pair is byte-stable.

use crate::{cursor::Endian, schema::record::TransformError, value::Value};
use encoding_rs::{UTF_8, UTF_16BE, UTF_16LE};

/// Collapse an aggregated value into raw bytes. Accepts a list of `u8`
/// items (the usual controller output) or a single scalar byte.
pub fn bytes_of(value: &Value) -> Result<Vec<u8>, TransformError> {
    match value {
        Value::U8(byte) => Ok(vec![*byte]),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::U8(byte) => Ok(*byte),
                other => Err(TransformError::new(format!(
                    "expected a u8 sequence, found a {} item",
                    other.kind()
                ))),
            })
            .collect(),
        other => Err(TransformError::new(format!(
            "expected a u8 sequence, found {}",
            other.kind()
        ))),
    }
}

fn text_of(value: &Value) -> Result<&str, TransformError> {
    value.as_text().map(String::as_str).ok_or_else(|| {
        TransformError::new(format!("expected text, found {}", value.kind()))
    })
}

fn to_byte_list(bytes: Vec<u8>) -> Value {
    Value::List(bytes.into_iter().map(Value::U8).collect())
}

pub fn utf8_decode(value: &Value) -> Result<Value, TransformError> {
    let bytes = bytes_of(value)?;
    let (text, _) = UTF_8.decode_without_bom_handling(&bytes);

    Ok(Value::Text(text.into_owned()))
}

pub fn utf8_encode(value: &Value) -> Result<Value, TransformError> {
    Ok(to_byte_list(text_of(value)?.as_bytes().to_vec()))
}

pub fn utf16_decode(value: &Value, endian: Endian) -> Result<Value, TransformError> {
    let bytes = bytes_of(value)?;
    let encoding = match endian {
        Endian::Big => UTF_16BE,
        Endian::Little => UTF_16LE,
    };
    let (text, _) = encoding.decode_without_bom_handling(&bytes);

    Ok(Value::Text(text.into_owned()))
}

pub fn utf16_encode(value: &Value, endian: Endian) -> Result<Value, TransformError> {
    let text = text_of(value)?;
    let mut bytes = Vec::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        let pair = match endian {
            Endian::Big => unit.to_be_bytes(),
            Endian::Little => unit.to_le_bytes(),
        };
        bytes.extend_from_slice(&pair);
    }

    Ok(to_byte_list(bytes))
}

pub fn utf32_decode(value: &Value, endian: Endian) -> Result<Value, TransformError> {
    let bytes = bytes_of(value)?;
    if !bytes.len().is_multiple_of(4) {
        return Err(TransformError::new(format!(
            "utf-32 input length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    let mut text = String::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let unit = match endian {
            Endian::Big => u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            Endian::Little => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        };
        text.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    Ok(Value::Text(text))
}

pub fn utf32_encode(value: &Value, endian: Endian) -> Result<Value, TransformError> {
    let text = text_of(value)?;
    let mut bytes = Vec::with_capacity(text.len() * 4);
    for ch in text.chars() {
        let quad = match endian {
            Endian::Big => u32::from(ch).to_be_bytes(),
            Endian::Little => u32::from(ch).to_le_bytes(),
        };
        bytes.extend_from_slice(&quad);
    }

    Ok(to_byte_list(bytes))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{utf8_decode, utf8_encode, utf16_decode, utf16_encode, utf32_decode, utf32_encode};
    use crate::{cursor::Endian, value::Value};

    fn byte_list(bytes: &[u8]) -> Value {
        Value::List(bytes.iter().copied().map(Value::U8).collect())
    }

    #[test]
    fn utf8_decodes_multibyte_sequences() {
        let value = byte_list("héllo".as_bytes());
        assert_eq!(
            utf8_decode(&value).expect("decode"),
            Value::Text("héllo".to_string())
        );
    }

    #[test]
    fn utf8_invalid_bytes_become_replacement_chars() {
        let value = byte_list(&[0x61, 0xFF, 0x62]);
        assert_eq!(
            utf8_decode(&value).expect("lossy decode"),
            Value::Text("a\u{FFFD}b".to_string())
        );
    }

    #[test]
    fn utf8_round_trips() {
        let original = byte_list("sample ±text".as_bytes());
        let text = utf8_decode(&original).expect("decode");
        assert_eq!(utf8_encode(&text).expect("encode"), original);
    }

    #[test]
    fn utf16_honours_declared_endianness() {
        let le = byte_list(&[0x68, 0x00, 0x69, 0x00]);
        assert_eq!(
            utf16_decode(&le, Endian::Little).expect("decode"),
            Value::Text("hi".to_string())
        );

        let be = utf16_encode(&Value::Text("hi".to_string()), Endian::Big).expect("encode");
        assert_eq!(be, byte_list(&[0x00, 0x68, 0x00, 0x69]));
    }

    #[test]
    fn utf32_round_trips_astral_chars() {
        let text = Value::Text("a𝄞b".to_string());
        let bytes = utf32_encode(&text, Endian::Big).expect("encode");
        assert_eq!(utf32_decode(&bytes, Endian::Big).expect("decode"), text);
    }

    #[test]
    fn utf8_rejects_non_byte_items() {
        let value = Value::List(vec![Value::U16(7)]);
        assert!(utf8_decode(&value).is_err());
    }
}
