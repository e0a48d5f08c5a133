//! Core storage engine traits.
//!
//! - [`StorageEngine`] - The main entry point for storage operations
//! - [`Transaction`] - ACID transaction support with read/write operations
//! - [`Cursor`] - Positioned traversal over a key range

use std::ops::Bound;

use super::StorageResult;

/// A key-value pair returned by scans and cursors.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Result type for cursor operations that return a key-value pair.
pub type CursorResult = StorageResult<Option<KeyValue>>;

/// Order in which a scan visits keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ascending byte order.
    Forward,
    /// Descending byte order.
    Backward,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// An owned range of keys within one logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower bound.
    pub start: Bound<Vec<u8>>,
    /// Upper bound.
    pub end: Bound<Vec<u8>>,
}

impl KeyRange {
    /// Creates a range from two bounds.
    #[must_use]
    pub const fn new(start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> Self {
        Self { start, end }
    }

    /// The range covering every key.
    #[must_use]
    pub const fn all() -> Self {
        Self { start: Bound::Unbounded, end: Bound::Unbounded }
    }

    /// Returns `true` if `key` lies inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let above = match &self.start {
            Bound::Included(s) => key >= s.as_slice(),
            Bound::Excluded(s) => key > s.as_slice(),
            Bound::Unbounded => true,
        };
        let below = match &self.end {
            Bound::Included(e) => key <= e.as_slice(),
            Bound::Excluded(e) => key < e.as_slice(),
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Returns `true` if no key can satisfy both bounds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s) | Bound::Excluded(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e)) => s >= e,
            _ => false,
        }
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

/// A storage engine that provides transactional key-value operations.
///
/// Engines are shared between threads; each thread begins its own
/// transactions. Transactions are owned values so a session can hold one
/// across calls and hand it to another thread.
pub trait StorageEngine: Send + Sync {
    /// The transaction type for this engine.
    type Transaction: Transaction + Send;

    /// Begin a read-only transaction over a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`](super::StorageError::Transaction)
    /// if the transaction cannot be started.
    fn begin_read(&self) -> StorageResult<Self::Transaction>;

    /// Begin a read-write transaction.
    ///
    /// Depending on the backend, write transactions may be serialized.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`](super::StorageError::Transaction)
    /// if the transaction cannot be started.
    fn begin_write(&self) -> StorageResult<Self::Transaction>;

    /// Flush any buffered data to durable storage.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// A transaction that provides ACID key-value operations.
///
/// Write transactions must be explicitly committed; dropping one without
/// committing rolls it back.
pub trait Transaction {
    /// The cursor type for positioned traversal.
    type Cursor<'a>: Cursor
    where
        Self: 'a;

    /// Get a value by key from a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn get(&self, table: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Insert or replace a key-value pair.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`](super::StorageError::ReadOnly) on a
    /// read transaction.
    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a key, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`](super::StorageError::ReadOnly) on a
    /// read transaction.
    fn delete(&mut self, table: &str, key: &[u8]) -> StorageResult<bool>;

    /// Fetch up to `limit` entries of `range` in `direction`.
    ///
    /// When `resume_after` is given, the scan continues strictly past that
    /// key in the scan direction, so feeding back the last key of one batch
    /// yields the next batch. Entries are returned in scan order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn scan(
        &self,
        table: &str,
        range: &KeyRange,
        resume_after: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> StorageResult<Vec<KeyValue>>;

    /// Create an unpositioned cursor over `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be created.
    fn cursor(&self, table: &str, range: KeyRange) -> StorageResult<Self::Cursor<'_>>;

    /// Commit the transaction, making all changes durable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`](super::StorageError::Transaction)
    /// if the commit fails.
    fn commit(self) -> StorageResult<()>;

    /// Roll the transaction back, discarding all changes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`](super::StorageError::Transaction)
    /// if the abort fails.
    fn rollback(self) -> StorageResult<()>;

    /// Check if this is a read-only transaction.
    fn is_read_only(&self) -> bool;
}

/// A positioned traversal over a key range.
///
/// A fresh cursor is unpositioned: [`Cursor::next`] starts from the first
/// key and [`Cursor::prev`] from the last. Stepping past either end leaves
/// the cursor unpositioned again.
pub trait Cursor {
    /// Position at the first key greater than or equal to `key`.
    fn seek(&mut self, key: &[u8]) -> CursorResult;

    /// Position at the first key of the range.
    fn seek_first(&mut self) -> CursorResult;

    /// Position at the last key of the range.
    fn seek_last(&mut self) -> CursorResult;

    /// Step to the next key.
    fn next(&mut self) -> CursorResult;

    /// Step to the previous key.
    fn prev(&mut self) -> CursorResult;

    /// The entry at the current position.
    fn current(&self) -> Option<(&[u8], &[u8])>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_range_contains() {
        let range =
            KeyRange::new(Bound::Included(b"b".to_vec()), Bound::Excluded(b"d".to_vec()));
        assert!(!range.contains(b"a"));
        assert!(range.contains(b"b"));
        assert!(range.contains(b"c\xff"));
        assert!(!range.contains(b"d"));
        assert!(KeyRange::all().contains(b""));
    }

    #[test]
    fn key_range_emptiness() {
        let point = KeyRange::new(Bound::Included(b"k".to_vec()), Bound::Included(b"k".to_vec()));
        assert!(!point.is_empty());
        let half_open =
            KeyRange::new(Bound::Included(b"k".to_vec()), Bound::Excluded(b"k".to_vec()));
        assert!(half_open.is_empty());
        assert!(!KeyRange::all().is_empty());
    }

    #[test]
    fn direction_reverse() {
        assert_eq!(Direction::Forward.reverse(), Direction::Backward);
        assert_eq!(Direction::Backward.reverse(), Direction::Forward);
    }
}
