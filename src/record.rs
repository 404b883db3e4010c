use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// A field value held in a record.
///
/// The first seven variants are the wire-representable set of the inline
/// value codec. `Bytes` carries raw binary columns without a UTF-8
/// annotation and `List` carries repeated columnar fields; both are
/// coerced to their string rendering when they reach a byte stream that
/// has no tag for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get a short preview string for display
    pub fn preview(&self, max_len: usize) -> String {
        match self {
            Value::Str(s) => {
                if s.len() <= max_len {
                    format!("\"{}\"", s)
                } else {
                    format!("\"{}...\" ({} bytes)", truncate_on_boundary(s, max_len), s.len())
                }
            }
            Value::Bytes(b) => {
                if b.len() <= max_len / 2 {
                    format!("x'{}'", hex_encode(b))
                } else {
                    format!("x'{}...' ({} bytes)", hex_encode(&b[..max_len / 2]), b.len())
                }
            }
            other => other.to_string(),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn truncate_on_boundary(s: &str, max_len: usize) -> &str {
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "x'{}'", hex_encode(b)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

/// A record value: field name to tagged value. Ordered so that encodings
/// are deterministic.
pub type FieldMap = BTreeMap<String, Value>;

/// A stored record: opaque key bytes plus a field map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub fields: FieldMap,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, fields: FieldMap) -> Self {
        Self {
            key: key.into(),
            fields,
        }
    }
}

/// Compare two keys as unsigned byte sequences.
///
/// Byte slices in Rust already order bytes as unsigned 0..=255; this
/// wrapper exists so every ordering decision in the store goes through one
/// named comparator.
#[inline]
pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_comparison_is_unsigned() {
        // 0x7F must order below 0x80; a signed comparison would reverse them.
        assert_eq!(compare_keys(&[0x7F], &[0x80]), Ordering::Less);
        assert_eq!(compare_keys(&[0x80], &[0x7F]), Ordering::Greater);
        assert_eq!(compare_keys(&[0xFF], &[0x00]), Ordering::Greater);
    }

    #[test]
    fn test_key_comparison_prefix() {
        assert_eq!(compare_keys(b"key", b"key-1"), Ordering::Less);
        assert_eq!(compare_keys(b"key-1", b"key-1"), Ordering::Equal);
    }

    #[test]
    fn test_list_display_coercion() {
        let v = Value::List(vec![Value::Int(1), Value::Str("two".into())]);
        assert_eq!(v.to_string(), "[1, two]");
    }

    #[test]
    fn test_preview_truncates_long_strings() {
        let v = Value::Str("a".repeat(100));
        let preview = v.preview(10);
        assert!(preview.starts_with("\"aaaaaaaaaa..."));
        assert!(preview.contains("100 bytes"));
    }

    #[test]
    fn test_bytes_render_as_hex() {
        let v = Value::Bytes(vec![0x6a, 0x70, 0xff]);
        assert_eq!(v.to_string(), "x'6a70ff'");
        assert_eq!(v.preview(16), "x'6a70ff'");

        let long = Value::Bytes(vec![0xab; 40]);
        let preview = long.preview(8);
        assert!(preview.starts_with("x'abababab..."));
        assert!(preview.contains("40 bytes"));
    }

    #[test]
    fn test_value_json_is_untagged() {
        let v = Value::Int(42);
        assert_eq!(serde_json::to_string(&v).unwrap(), "42");
        let s = Value::Str("hi".into());
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"hi\"");
    }
}
