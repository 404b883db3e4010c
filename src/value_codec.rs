//! Tagged byte-stream codec for inline record values.
//!
//! Wire format, all integers big-endian:
//! `[u32 entry_count]` then per entry `[u32 key_len][key utf-8][u8 tag][payload]`.
//! Tags: 0 null, 1 int32, 2 int64, 3 float32, 4 float64, 5 boolean,
//! 6 string (`[u32 len][utf-8]`). Variants with no wire tag are coerced to
//! their string rendering under tag 6.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::Result;
use crate::record::{FieldMap, Value};

const TAG_NULL: u8 = 0;
const TAG_INT32: u8 = 1;
const TAG_INT64: u8 = 2;
const TAG_FLOAT32: u8 = 3;
const TAG_FLOAT64: u8 = 4;
const TAG_BOOL: u8 = 5;
const TAG_STRING: u8 = 6;

/// Encode a field map into the tagged byte stream.
pub fn encode_fields(fields: &FieldMap) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(16 + fields.len() * 16);
    out.write_u32::<BigEndian>(fields.len() as u32)?;

    for (key, value) in fields {
        out.write_u32::<BigEndian>(key.len() as u32)?;
        out.extend_from_slice(key.as_bytes());
        encode_value(&mut out, value)?;
    }
    Ok(out)
}

fn encode_value(out: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.write_u8(TAG_NULL)?,
        Value::Int(v) => {
            out.write_u8(TAG_INT32)?;
            out.write_i32::<BigEndian>(*v)?;
        }
        Value::Long(v) => {
            out.write_u8(TAG_INT64)?;
            out.write_i64::<BigEndian>(*v)?;
        }
        Value::Float(v) => {
            out.write_u8(TAG_FLOAT32)?;
            out.write_f32::<BigEndian>(*v)?;
        }
        Value::Double(v) => {
            out.write_u8(TAG_FLOAT64)?;
            out.write_f64::<BigEndian>(*v)?;
        }
        Value::Bool(v) => {
            out.write_u8(TAG_BOOL)?;
            out.write_u8(if *v { 1 } else { 0 })?;
        }
        Value::Str(s) => write_string(out, s)?,
        // No wire tag for lists; coerce to the string rendering.
        other => write_string(out, &other.to_string())?,
    }
    Ok(())
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<()> {
    out.write_u8(TAG_STRING)?;
    out.write_u32::<BigEndian>(s.len() as u32)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Decode a tagged byte stream back into a field map.
///
/// The decoder is deliberately lenient: truncated input or an unknown tag
/// stops the walk and returns the entries decoded so far. Inline payloads
/// can be damaged by earlier bad writes, and a partial map is more useful
/// to the caller than a hard failure at this boundary.
pub fn decode_fields(data: &[u8]) -> FieldMap {
    let mut fields = FieldMap::new();
    if data.len() < 4 {
        return fields;
    }

    let count = BigEndian::read_u32(&data[0..4]) as usize;
    let mut offset = 4;

    for _ in 0..count {
        let (key, value, consumed) = match decode_entry(&data[offset..]) {
            Some(entry) => entry,
            None => break,
        };
        fields.insert(key, value);
        offset += consumed;
    }
    fields
}

/// Decode one `[key_len][key][tag][payload]` entry. Returns `None` on any
/// truncation or malformed field.
fn decode_entry(data: &[u8]) -> Option<(String, Value, usize)> {
    if data.len() < 4 {
        return None;
    }
    let key_len = BigEndian::read_u32(&data[0..4]) as usize;
    let mut offset = 4;

    if data.len() < offset + key_len {
        return None;
    }
    let key = std::str::from_utf8(&data[offset..offset + key_len])
        .ok()?
        .to_string();
    offset += key_len;

    let (value, len) = decode_value(&data[offset..])?;
    offset += len;

    Some((key, value, offset))
}

fn decode_value(data: &[u8]) -> Option<(Value, usize)> {
    let tag = *data.first()?;
    let payload = &data[1..];

    let (value, payload_len) = match tag {
        TAG_NULL => (Value::Null, 0),
        TAG_INT32 => {
            if payload.len() < 4 {
                return None;
            }
            (Value::Int(BigEndian::read_i32(&payload[..4])), 4)
        }
        TAG_INT64 => {
            if payload.len() < 8 {
                return None;
            }
            (Value::Long(BigEndian::read_i64(&payload[..8])), 8)
        }
        TAG_FLOAT32 => {
            if payload.len() < 4 {
                return None;
            }
            (Value::Float(BigEndian::read_f32(&payload[..4])), 4)
        }
        TAG_FLOAT64 => {
            if payload.len() < 8 {
                return None;
            }
            (Value::Double(BigEndian::read_f64(&payload[..8])), 8)
        }
        TAG_BOOL => {
            let byte = *payload.first()?;
            (Value::Bool(byte != 0), 1)
        }
        TAG_STRING => {
            if payload.len() < 4 {
                return None;
            }
            let len = BigEndian::read_u32(&payload[..4]) as usize;
            if payload.len() < 4 + len {
                return None;
            }
            let s = String::from_utf8_lossy(&payload[4..4 + len]).to_string();
            (Value::Str(s), 4 + len)
        }
        // Unknown tag: payload length is unknowable, stop here.
        _ => return None,
    };

    Some((value, 1 + payload_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), Value::Str("John Doe".to_string()));
        fields.insert("age".to_string(), Value::Int(30));
        fields.insert("score".to_string(), Value::Double(99.5));
        fields.insert("ratio".to_string(), Value::Float(0.25));
        fields.insert("count".to_string(), Value::Long(1 << 40));
        fields.insert("active".to_string(), Value::Bool(true));
        fields.insert("nickname".to_string(), Value::Null);
        fields
    }

    #[test]
    fn test_round_trip_all_variants() {
        let fields = sample_map();
        let encoded = encode_fields(&fields).unwrap();
        assert_eq!(decode_fields(&encoded), fields);
    }

    #[test]
    fn test_empty_map() {
        let fields = FieldMap::new();
        let encoded = encode_fields(&fields).unwrap();
        assert_eq!(encoded, vec![0, 0, 0, 0]);
        assert!(decode_fields(&encoded).is_empty());
    }

    #[test]
    fn test_list_coerced_to_string() {
        let mut fields = FieldMap::new();
        fields.insert(
            "tags".to_string(),
            Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]),
        );
        let encoded = encode_fields(&fields).unwrap();
        let decoded = decode_fields(&encoded);
        assert_eq!(decoded["tags"], Value::Str("[a, b]".to_string()));
    }

    #[test]
    fn test_bytes_coerced_to_hex_string() {
        let mut fields = FieldMap::new();
        fields.insert("raw".to_string(), Value::Bytes(vec![0xde, 0xad]));
        let encoded = encode_fields(&fields).unwrap();
        let decoded = decode_fields(&encoded);
        assert_eq!(decoded["raw"], Value::Str("x'dead'".to_string()));
    }

    #[test]
    fn test_truncated_input_yields_partial_map() {
        let fields = sample_map();
        let encoded = encode_fields(&fields).unwrap();

        // Chop the stream mid-entry: the decoder keeps what it parsed.
        let partial = decode_fields(&encoded[..encoded.len() - 3]);
        assert!(partial.len() < fields.len());
        for (key, value) in &partial {
            assert_eq!(&fields[key], value);
        }
    }

    #[test]
    fn test_unknown_tag_stops_decode() {
        let mut fields = FieldMap::new();
        fields.insert("a".to_string(), Value::Int(1));
        let mut encoded = encode_fields(&fields).unwrap();

        // Claim two entries but give the second a bogus tag.
        BigEndian::write_u32(&mut encoded[0..4], 2);
        encoded.extend_from_slice(&[0, 0, 0, 1, b'b', 0xEE]);

        let decoded = decode_fields(&encoded);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded["a"], Value::Int(1));
    }

    #[test]
    fn test_garbage_input_does_not_panic() {
        assert!(decode_fields(&[]).is_empty());
        assert!(decode_fields(&[0xFF]).is_empty());
        assert!(decode_fields(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00]).is_empty());
    }
}
