//! Sort-order preserving encoding for key column values.
//!
//! # Layout
//!
//! Each value starts with a type tag, so values of different types order by
//! tag (`Null` < `Bool` < `Int` < `Float` < `String` < `Bytes`):
//!
//! - integers: sign bit flipped, big-endian
//! - floats: positive values get the sign bit flipped, negative values are
//!   fully inverted, NaN sorts last
//! - strings and bytes: `0x00` escaped as `0x00 0x01`, terminated by
//!   `0x00 0x00`
//!
//! Every encoding is prefix-free, so a descending column is stored as the
//! bitwise complement of its ascending encoding and still concatenates
//! cleanly with the next column.
//!
//! # Example
//!
//! ```
//! use arbordb_core::encoding::sortable::{encode_sortable, decode_sortable};
//! use arbordb_core::Value;
//!
//! let mut encoded: Vec<_> = [Value::Int(10), Value::Int(-10), Value::Int(0)]
//!     .iter()
//!     .map(|v| encode_sortable(v))
//!     .collect();
//! encoded.sort();
//!
//! let decoded: Vec<_> = encoded.iter().map(|e| decode_sortable(e).unwrap()).collect();
//! assert_eq!(decoded, vec![Value::Int(-10), Value::Int(0), Value::Int(10)]);
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::{float_order_key, Value};

/// Type tags, in sort order.
pub mod tags {
    /// Null values sort first.
    pub const NULL: u8 = 0x00;
    /// Boolean values (false=0x00, true=0x01).
    pub const BOOL: u8 = 0x01;
    /// 64-bit signed integers.
    pub const INT: u8 = 0x02;
    /// 64-bit floating point numbers.
    pub const FLOAT: u8 = 0x03;
    /// UTF-8 strings.
    pub const STRING: u8 = 0x04;
    /// Raw bytes.
    pub const BYTES: u8 = 0x05;
}

const SIGN_FLIP_I64: u64 = 0x8000_0000_0000_0000;

const ESCAPE_BYTE: u8 = 0x01;
const TERMINATOR: u8 = 0x00;

/// Encodes a value in ascending order.
#[must_use]
pub fn encode_sortable(value: &Value) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    encode_sortable_into(value, &mut buf, false);
    buf
}

/// Appends the encoding of `value` to `buf`.
///
/// When `descending` is set the appended bytes are complemented so that
/// larger values produce smaller keys.
pub fn encode_sortable_into(value: &Value, buf: &mut Vec<u8>, descending: bool) {
    let start = buf.len();
    match value {
        Value::Null => buf.push(tags::NULL),
        Value::Bool(b) => {
            buf.push(tags::BOOL);
            buf.push(u8::from(*b));
        }
        Value::Int(i) => {
            buf.push(tags::INT);
            buf.extend_from_slice(&((*i as u64) ^ SIGN_FLIP_I64).to_be_bytes());
        }
        Value::Float(f) => {
            buf.push(tags::FLOAT);
            buf.extend_from_slice(&float_order_key(*f).to_be_bytes());
        }
        Value::String(s) => {
            buf.push(tags::STRING);
            escape_into(s.as_bytes(), buf);
        }
        Value::Bytes(b) => {
            buf.push(tags::BYTES);
            escape_into(b, buf);
        }
    }
    if descending {
        for byte in &mut buf[start..] {
            *byte = !*byte;
        }
    }
}

fn escape_into(data: &[u8], buf: &mut Vec<u8>) {
    buf.reserve(data.len() + 2);
    for &byte in data {
        if byte == 0x00 {
            buf.push(0x00);
            buf.push(ESCAPE_BYTE);
        } else {
            buf.push(byte);
        }
    }
    buf.push(TERMINATOR);
    buf.push(TERMINATOR);
}

/// Decodes a single ascending value, ignoring trailing bytes.
///
/// # Errors
///
/// Returns [`CoreError::Encoding`] if the bytes are malformed or truncated.
pub fn decode_sortable(bytes: &[u8]) -> CoreResult<Value> {
    decode_sortable_with_len(bytes, false).map(|(value, _)| value)
}

/// Decodes one value from the front of `bytes`, returning it with the number
/// of bytes consumed.
///
/// # Errors
///
/// Returns [`CoreError::Encoding`] if the bytes are malformed or truncated.
pub fn decode_sortable_with_len(bytes: &[u8], descending: bool) -> CoreResult<(Value, usize)> {
    let mut reader = Reader { bytes, pos: 0, mask: if descending { 0xFF } else { 0x00 } };
    let value = match reader.byte("type tag")? {
        tags::NULL => Value::Null,
        tags::BOOL => Value::Bool(reader.byte("bool")? != 0),
        tags::INT => Value::Int((reader.word("int")? ^ SIGN_FLIP_I64) as i64),
        tags::FLOAT => {
            let encoded = reader.word("float")?;
            let bits = if encoded == u64::MAX {
                f64::NAN.to_bits()
            } else if encoded & SIGN_FLIP_I64 != 0 {
                encoded ^ SIGN_FLIP_I64
            } else {
                !encoded
            };
            Value::Float(f64::from_bits(bits))
        }
        tags::STRING => {
            let raw = reader.escaped()?;
            Value::String(
                String::from_utf8(raw)
                    .map_err(|e| CoreError::Encoding(format!("invalid UTF-8: {e}")))?,
            )
        }
        tags::BYTES => Value::Bytes(reader.escaped()?),
        tag => return Err(CoreError::Encoding(format!("unknown sortable type tag: {tag:#x}"))),
    };
    Ok((value, reader.pos))
}

/// Returns the smallest byte string greater than every string starting with
/// `prefix`, or `None` if no such string exists (the prefix is all `0xFF`).
#[must_use]
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut successor = prefix.to_vec();
    while let Some(last) = successor.pop() {
        if last != 0xFF {
            successor.push(last + 1);
            return Some(successor);
        }
    }
    None
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    mask: u8,
}

impl Reader<'_> {
    fn byte(&mut self, what: &str) -> CoreResult<u8> {
        let byte = self.bytes.get(self.pos).ok_or_else(|| {
            CoreError::Encoding(format!("unexpected end of input reading {what}"))
        })?;
        self.pos += 1;
        Ok(byte ^ self.mask)
    }

    fn word(&mut self, what: &str) -> CoreResult<u64> {
        let mut raw = [0u8; 8];
        for slot in &mut raw {
            *slot = self.byte(what)?;
        }
        Ok(u64::from_be_bytes(raw))
    }

    fn escaped(&mut self) -> CoreResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let byte = self.byte("escaped bytes")?;
            if byte != 0x00 {
                out.push(byte);
                continue;
            }
            match self.byte("escaped bytes")? {
                TERMINATOR => return Ok(out),
                ESCAPE_BYTE => out.push(0x00),
                other => {
                    return Err(CoreError::Encoding(format!(
                        "invalid escape sequence: 0x00 0x{other:02x}"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn assert_sorted(values: &[Value]) {
        let encoded: Vec<_> = values.iter().map(encode_sortable).collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn type_tags_order_across_types() {
        assert_sorted(&[
            Value::Null,
            Value::Bool(true),
            Value::Int(i64::MAX),
            Value::Float(f64::NEG_INFINITY),
            Value::String(String::new()),
            Value::Bytes(Vec::new()),
        ]);
    }

    #[test]
    fn int_order() {
        assert_sorted(&[
            Value::Int(i64::MIN),
            Value::Int(-1000),
            Value::Int(-1),
            Value::Int(0),
            Value::Int(1),
            Value::Int(i64::MAX),
        ]);
    }

    #[test]
    fn float_order() {
        assert_sorted(&[
            Value::Float(f64::NEG_INFINITY),
            Value::Float(-1.5),
            Value::Float(-0.0),
            Value::Float(0.0),
            Value::Float(2.25),
            Value::Float(f64::INFINITY),
            Value::Float(f64::NAN),
        ]);
    }

    #[test]
    fn string_order_with_embedded_nulls() {
        assert_sorted(&[
            Value::from(""),
            Value::from("\0"),
            Value::from("\0a"),
            Value::from("a"),
            Value::from("aa"),
            Value::from("ab"),
            Value::from("b"),
        ]);
    }

    #[test]
    fn descending_reverses_order() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        encode_sortable_into(&Value::from("M"), &mut a, true);
        encode_sortable_into(&Value::from("Y"), &mut b, true);
        assert!(a > b);

        let (decoded, used) = decode_sortable_with_len(&a, true).unwrap();
        assert_eq!(decoded, Value::from("M"));
        assert_eq!(used, a.len());
    }

    #[test]
    fn decode_reports_consumed_length() {
        let mut key = Vec::new();
        encode_sortable_into(&Value::Int(3), &mut key, false);
        encode_sortable_into(&Value::from("x\0y"), &mut key, true);

        let (first, used) = decode_sortable_with_len(&key, false).unwrap();
        assert_eq!(first, Value::Int(3));
        let (second, rest) = decode_sortable_with_len(&key[used..], true).unwrap();
        assert_eq!(second, Value::from("x\0y"));
        assert_eq!(used + rest, key.len());
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert!(decode_sortable(&[]).is_err());
        assert!(decode_sortable(&[tags::INT, 1, 2]).is_err());
        assert!(decode_sortable(&[tags::STRING, b'a', 0x00]).is_err());
        assert!(decode_sortable(&[tags::STRING, 0x00, 0x07]).is_err());
        assert!(decode_sortable(&[0x7f]).is_err());
    }

    #[test]
    fn prefix_successor_bounds_every_extension() {
        assert_eq!(prefix_successor(&[0x02, 0x10]), Some(vec![0x02, 0x11]));
        assert_eq!(prefix_successor(&[0x02, 0xFF, 0xFF]), Some(vec![0x03]));
        assert_eq!(prefix_successor(&[0xFF]), None);
        assert_eq!(prefix_successor(&[]), None);

        let prefix = encode_sortable(&Value::Int(5));
        let mut extended = prefix.clone();
        extended.extend_from_slice(&[0xFF; 12]);
        assert!(extended < prefix_successor(&prefix).unwrap());
    }
}
