//! Physical table layout for the redb backend.
//!
//! Redb tables are declared statically, so logical tables are emulated by
//! prefixing every key with `<table name> 0x00`. Because table names never
//! contain a zero byte, keys of one logical table form a contiguous run that
//! preserves their bytewise order.

use std::ops::Bound;

use redb::TableDefinition;

use crate::engine::{Direction, KeyRange};

/// The physical table that stores all key-value pairs.
pub const DATA_TABLE: TableDefinition<'static, &[u8], &[u8]> =
    TableDefinition::new("arbor_data");

/// Separator byte between table name and key in the encoded key.
pub const KEY_SEPARATOR: u8 = 0x00;

/// Encode a logical table name and key into a physical key.
pub fn encode_key(table: &str, key: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(table.len() + 1 + key.len());
    encoded.extend_from_slice(table.as_bytes());
    encoded.push(KEY_SEPARATOR);
    encoded.extend_from_slice(key);
    encoded
}

/// Split a physical key into its logical table name and original key.
///
/// Returns `None` if the key is malformed (missing separator).
pub fn decode_key(encoded: &[u8]) -> Option<(&str, &[u8])> {
    let sep = encoded.iter().position(|&b| b == KEY_SEPARATOR)?;
    let table = std::str::from_utf8(&encoded[..sep]).ok()?;
    Some((table, &encoded[sep + 1..]))
}

/// First physical key of a logical table.
pub fn table_start_key(table: &str) -> Vec<u8> {
    encode_key(table, &[])
}

/// First physical key past a logical table.
pub fn table_end_key(table: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(table.len() + 1);
    key.extend_from_slice(table.as_bytes());
    key.push(KEY_SEPARATOR + 1);
    key
}

/// Translate a logical range into physical bounds, narrowing it past
/// `resume_after` in the scan direction.
pub fn physical_bounds(
    table: &str,
    range: &KeyRange,
    resume_after: Option<&[u8]>,
    direction: Direction,
) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let mut start = match &range.start {
        Bound::Included(k) => Bound::Included(encode_key(table, k)),
        Bound::Excluded(k) => Bound::Excluded(encode_key(table, k)),
        Bound::Unbounded => Bound::Included(table_start_key(table)),
    };
    let mut end = match &range.end {
        Bound::Included(k) => Bound::Included(encode_key(table, k)),
        Bound::Excluded(k) => Bound::Excluded(encode_key(table, k)),
        Bound::Unbounded => Bound::Excluded(table_end_key(table)),
    };
    if let Some(resume) = resume_after {
        match direction {
            Direction::Forward => start = Bound::Excluded(encode_key(table, resume)),
            Direction::Backward => end = Bound::Excluded(encode_key(table, resume)),
        }
    }
    (start, end)
}

/// Returns `true` when the physical bounds admit no key. Redb rejects
/// inverted ranges, so callers check this first.
pub fn bounds_empty(start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> bool {
    KeyRange::new(start.clone(), end.clone()).is_empty()
}
