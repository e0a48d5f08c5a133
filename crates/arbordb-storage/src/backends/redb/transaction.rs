//! Redb transactions and cursors.
//!
//! Scans are answered in bounded batches: a cursor holds at most one batch
//! of entries and fetches the neighbouring batch on demand by resuming past
//! the first or last key it holds.

use std::ops::Bound;

use redb::{AccessGuard, ReadTransaction, ReadableTable, TableError, WriteTransaction};

use crate::engine::{
    Cursor, CursorResult, Direction, KeyRange, KeyValue, StorageError, StorageResult, Transaction,
};

use super::tables::{bounds_empty, decode_key, encode_key, physical_bounds, DATA_TABLE};

/// Entries fetched per cursor batch.
const DEFAULT_BATCH_SIZE: usize = 1000;

fn internal(e: impl std::fmt::Display) -> StorageError {
    StorageError::Internal(e.to_string())
}

/// A transaction for the Redb storage engine.
///
/// Wraps both read-only and read-write Redb transactions behind the
/// [`Transaction`] trait.
#[allow(clippy::large_enum_variant)]
pub enum RedbTransaction {
    /// A read-only transaction.
    Read(ReadTransaction),
    /// A read-write transaction.
    Write(WriteTransaction),
}

impl RedbTransaction {
    /// Create a new read-only transaction.
    #[must_use]
    pub const fn new_read(tx: ReadTransaction) -> Self {
        Self::Read(tx)
    }

    /// Create a new read-write transaction.
    #[must_use]
    pub const fn new_write(tx: WriteTransaction) -> Self {
        Self::Write(tx)
    }
}

impl Transaction for RedbTransaction {
    type Cursor<'a>
        = RedbCursor<'a>
    where
        Self: 'a;

    fn get(&self, table: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let encoded = encode_key(table, key);
        match self {
            Self::Read(tx) => match tx.open_table(DATA_TABLE) {
                Ok(t) => get_from(&t, &encoded),
                // No data table means no data, which is not an error
                Err(TableError::TableDoesNotExist(_)) => Ok(None),
                Err(e) => Err(internal(e)),
            },
            Self::Write(tx) => get_from(&tx.open_table(DATA_TABLE).map_err(internal)?, &encoded),
        }
    }

    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> StorageResult<()> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => {
                let encoded = encode_key(table, key);
                let mut t = tx.open_table(DATA_TABLE).map_err(internal)?;
                t.insert(encoded.as_slice(), value).map_err(internal)?;
                Ok(())
            }
        }
    }

    fn delete(&mut self, table: &str, key: &[u8]) -> StorageResult<bool> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => {
                let encoded = encode_key(table, key);
                let mut t = tx.open_table(DATA_TABLE).map_err(internal)?;
                let removed = t.remove(encoded.as_slice()).map_err(internal)?;
                Ok(removed.is_some())
            }
        }
    }

    fn scan(
        &self,
        table: &str,
        range: &KeyRange,
        resume_after: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> StorageResult<Vec<KeyValue>> {
        let (start, end) = physical_bounds(table, range, resume_after, direction);
        if limit == 0 || bounds_empty(&start, &end) {
            return Ok(Vec::new());
        }
        match self {
            Self::Read(tx) => match tx.open_table(DATA_TABLE) {
                Ok(t) => scan_table(&t, &start, &end, direction, limit),
                // Table doesn't exist yet, return empty result (not an error)
                Err(TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
                Err(e) => Err(internal(e)),
            },
            Self::Write(tx) => {
                let t = tx.open_table(DATA_TABLE).map_err(internal)?;
                scan_table(&t, &start, &end, direction, limit)
            }
        }
    }

    fn cursor(&self, table: &str, range: KeyRange) -> StorageResult<Self::Cursor<'_>> {
        Ok(RedbCursor::new(self, table.to_owned(), range, DEFAULT_BATCH_SIZE))
    }

    fn commit(self) -> StorageResult<()> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => tx.commit().map_err(|e| StorageError::Transaction(e.to_string())),
        }
    }

    fn rollback(self) -> StorageResult<()> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => tx.abort().map_err(|e| StorageError::Transaction(e.to_string())),
        }
    }

    fn is_read_only(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}

fn get_from<T>(table: &T, encoded: &[u8]) -> StorageResult<Option<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    Ok(table.get(encoded).map_err(internal)?.map(|v| v.value().to_vec()))
}

fn scan_table<T>(
    table: &T,
    start: &Bound<Vec<u8>>,
    end: &Bound<Vec<u8>>,
    direction: Direction,
    limit: usize,
) -> StorageResult<Vec<KeyValue>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let bounds: (Bound<&[u8]>, Bound<&[u8]>) = (borrow_bound(start), borrow_bound(end));
    let entries = table.range::<&[u8]>(bounds).map_err(internal)?;
    match direction {
        Direction::Forward => collect_entries(entries, limit),
        Direction::Backward => collect_entries(entries.rev(), limit),
    }
}

type Entry<'a> =
    Result<(AccessGuard<'a, &'static [u8]>, AccessGuard<'a, &'static [u8]>), redb::StorageError>;

fn collect_entries<'a>(
    entries: impl Iterator<Item = Entry<'a>>,
    limit: usize,
) -> StorageResult<Vec<KeyValue>> {
    let mut out = Vec::with_capacity(limit.min(1024));
    for entry in entries {
        if out.len() >= limit {
            break;
        }
        let (k, v) = entry.map_err(internal)?;
        if let Some((_, key)) = decode_key(k.value()) {
            out.push((key.to_vec(), v.value().to_vec()));
        }
    }
    Ok(out)
}

fn borrow_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// A batched cursor over a key range of one logical table.
///
/// At any time the cursor holds at most `batch_size` entries, in ascending
/// key order, plus its position within them.
pub struct RedbCursor<'a> {
    tx: &'a RedbTransaction,
    table: String,
    range: KeyRange,
    batch: Vec<KeyValue>,
    position: Option<usize>,
    batch_size: usize,
}

impl<'a> RedbCursor<'a> {
    /// Create an unpositioned cursor.
    #[must_use]
    pub fn new(tx: &'a RedbTransaction, table: String, range: KeyRange, batch_size: usize) -> Self {
        Self { tx, table, range, batch: Vec::new(), position: None, batch_size: batch_size.max(1) }
    }

    fn fetch(
        &self,
        range: &KeyRange,
        resume_after: Option<&[u8]>,
        direction: Direction,
    ) -> StorageResult<Vec<KeyValue>> {
        let mut batch = self.tx.scan(&self.table, range, resume_after, direction, self.batch_size)?;
        if direction == Direction::Backward {
            batch.reverse();
        }
        Ok(batch)
    }

    fn land(&mut self, batch: Vec<KeyValue>, at_end: bool) -> CursorResult {
        self.batch = batch;
        self.position = match (self.batch.is_empty(), at_end) {
            (true, _) => None,
            (false, false) => Some(0),
            (false, true) => Some(self.batch.len() - 1),
        };
        Ok(self.current_owned())
    }

    fn current_owned(&self) -> Option<KeyValue> {
        self.position.and_then(|pos| self.batch.get(pos).cloned())
    }
}

impl Cursor for RedbCursor<'_> {
    fn seek(&mut self, key: &[u8]) -> CursorResult {
        let start = match &self.range.start {
            Bound::Included(s) | Bound::Excluded(s) if s.as_slice() >= key => {
                self.range.start.clone()
            }
            _ => Bound::Included(key.to_vec()),
        };
        let narrowed = KeyRange::new(start, self.range.end.clone());
        let batch = self.fetch(&narrowed, None, Direction::Forward)?;
        self.land(batch, false)
    }

    fn seek_first(&mut self) -> CursorResult {
        let batch = self.fetch(&self.range, None, Direction::Forward)?;
        self.land(batch, false)
    }

    fn seek_last(&mut self) -> CursorResult {
        let batch = self.fetch(&self.range, None, Direction::Backward)?;
        self.land(batch, true)
    }

    fn next(&mut self) -> CursorResult {
        let Some(pos) = self.position else {
            return self.seek_first();
        };
        if pos + 1 < self.batch.len() {
            self.position = Some(pos + 1);
            return Ok(self.current_owned());
        }
        let resume = self.batch.last().map(|(k, _)| k.clone());
        let batch = self.fetch(&self.range, resume.as_deref(), Direction::Forward)?;
        self.land(batch, false)
    }

    fn prev(&mut self) -> CursorResult {
        let Some(pos) = self.position else {
            return self.seek_last();
        };
        if pos > 0 {
            self.position = Some(pos - 1);
            return Ok(self.current_owned());
        }
        let resume = self.batch.first().map(|(k, _)| k.clone());
        let batch = self.fetch(&self.range, resume.as_deref(), Direction::Backward)?;
        self.land(batch, true)
    }

    fn current(&self) -> Option<(&[u8], &[u8])> {
        self.position.and_then(|pos| self.batch.get(pos)).map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::RedbEngine;
    use crate::engine::StorageEngine;

    fn engine_with(keys: &[&[u8]]) -> RedbEngine {
        let engine = RedbEngine::in_memory().expect("failed to create engine");
        let mut tx = engine.begin_write().expect("failed to begin write");
        for key in keys {
            tx.put("t", key, b"v").expect("failed to put");
        }
        tx.put("other", b"b", b"x").expect("failed to put");
        tx.commit().expect("failed to commit");
        engine
    }

    fn keys(entries: &[KeyValue]) -> Vec<&[u8]> {
        entries.iter().map(|(k, _)| k.as_slice()).collect()
    }

    #[test]
    fn scan_pages_in_both_directions() {
        let engine = engine_with(&[b"a", b"b", b"c", b"d", b"e"]);
        let tx = engine.begin_read().expect("failed to begin read");

        let first = tx.scan("t", &KeyRange::all(), None, Direction::Forward, 2).expect("scan");
        assert_eq!(keys(&first), vec![b"a".as_slice(), b"b"]);
        let second =
            tx.scan("t", &KeyRange::all(), Some(b"b"), Direction::Forward, 2).expect("scan");
        assert_eq!(keys(&second), vec![b"c".as_slice(), b"d"]);

        let back =
            tx.scan("t", &KeyRange::all(), Some(b"c"), Direction::Backward, 10).expect("scan");
        assert_eq!(keys(&back), vec![b"b".as_slice(), b"a"]);
    }

    #[test]
    fn scan_respects_bounds() {
        let engine = engine_with(&[b"a", b"b", b"c", b"d"]);
        let tx = engine.begin_read().expect("failed to begin read");
        let range = KeyRange::new(Bound::Excluded(b"a".to_vec()), Bound::Included(b"c".to_vec()));
        let entries = tx.scan("t", &range, None, Direction::Forward, 10).expect("scan");
        assert_eq!(keys(&entries), vec![b"b".as_slice(), b"c"]);

        let inverted =
            KeyRange::new(Bound::Included(b"d".to_vec()), Bound::Excluded(b"a".to_vec()));
        assert!(tx.scan("t", &inverted, None, Direction::Forward, 10).expect("scan").is_empty());
    }

    #[test]
    fn scan_of_missing_table_is_empty() {
        let engine = RedbEngine::in_memory().expect("failed to create engine");
        let tx = engine.begin_read().expect("failed to begin read");
        let entries =
            tx.scan("nope", &KeyRange::all(), None, Direction::Forward, 10).expect("scan");
        assert!(entries.is_empty());
    }

    #[test]
    fn cursor_crosses_batch_boundaries() {
        let engine = engine_with(&[b"a", b"b", b"c", b"d", b"e"]);
        let tx = engine.begin_read().expect("failed to begin read");
        let mut cursor = RedbCursor::new(&tx, "t".into(), KeyRange::all(), 2);

        let mut forward = Vec::new();
        while let Some((k, _)) = cursor.next().expect("next") {
            forward.push(k);
        }
        let expected: Vec<Vec<u8>> = [b"a", b"b", b"c", b"d", b"e"].map(|k| k.to_vec()).into();
        assert_eq!(forward, expected);

        let mut backward = Vec::new();
        while let Some((k, _)) = cursor.prev().expect("prev") {
            backward.push(k);
        }
        assert_eq!(backward.len(), 5);
        assert_eq!(backward.first(), Some(&b"e".to_vec()));
    }

    #[test]
    fn cursor_seek_lands_on_next_key() {
        let engine = engine_with(&[b"a", b"c", b"e"]);
        let tx = engine.begin_read().expect("failed to begin read");
        let mut cursor = tx.cursor("t", KeyRange::all()).expect("cursor");

        assert_eq!(cursor.seek(b"b").expect("seek").map(|(k, _)| k), Some(b"c".to_vec()));
        assert_eq!(cursor.current().map(|(k, _)| k.to_vec()), Some(b"c".to_vec()));
        assert_eq!(cursor.prev().expect("prev").map(|(k, _)| k), Some(b"a".to_vec()));
        assert_eq!(cursor.seek(b"f").expect("seek"), None);
        assert_eq!(cursor.seek_last().expect("seek_last").map(|(k, _)| k), Some(b"e".to_vec()));
    }

    #[test]
    fn read_transaction_rejects_writes() {
        let engine = RedbEngine::in_memory().expect("failed to create engine");
        let mut tx = engine.begin_read().expect("failed to begin read");
        assert!(matches!(tx.put("t", b"k", b"v"), Err(StorageError::ReadOnly)));
        assert!(matches!(tx.delete("t", b"k"), Err(StorageError::ReadOnly)));
    }
}
