//! The session-scoped bridge between cursors and the storage engine.
//!
//! Cursors never hold a storage transaction directly. They talk to a
//! [`StoreAdapter`], which owns at most one explicit transaction for its
//! session and otherwise reads each batch from a fresh snapshot. Worker
//! threads of a partitioned map obtain their own session through
//! [`StoreAdapter::derive_session`], so no transaction is ever shared
//! between threads.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use arbordb_storage::{
    Direction, KeyRange, KeyValue, StorageEngine, StorageError, Transaction,
};
use parking_lot::Mutex;
use tracing::trace;

use crate::error::QueryResult;

/// Kind of transaction a session begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Snapshot reads only.
    #[default]
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// Storage access for one session.
pub trait StoreAdapter: Send + Sync {
    /// Begins the session's explicit transaction.
    ///
    /// # Errors
    ///
    /// Fails if a transaction is already active or the engine refuses.
    fn begin_transaction(&self, mode: TransactionMode) -> QueryResult<()>;

    /// Commits the session's transaction.
    ///
    /// # Errors
    ///
    /// Fails if no transaction is active or the commit fails.
    fn commit_transaction(&self) -> QueryResult<()>;

    /// Aborts the session's transaction, if any.
    ///
    /// # Errors
    ///
    /// Fails if the engine cannot abort.
    fn rollback_transaction(&self) -> QueryResult<()>;

    /// Returns `true` while an explicit transaction is active.
    fn in_transaction(&self) -> bool;

    /// Fetches up to `limit` entries of `range` in `direction`, strictly
    /// after `resume_after` when given.
    ///
    /// # Errors
    ///
    /// Fails if the storage read fails.
    fn scan(
        &self,
        table: &str,
        range: &KeyRange,
        resume_after: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> QueryResult<Vec<KeyValue>>;

    /// Writes one entry. Without an explicit transaction the write commits
    /// immediately.
    ///
    /// # Errors
    ///
    /// Fails if the active transaction is read-only or the write fails.
    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> QueryResult<()>;

    /// Creates an independent session over the same store.
    fn derive_session(&self) -> Arc<dyn StoreAdapter>;
}

/// [`StoreAdapter`] over any [`StorageEngine`].
pub struct EngineAdapter<E: StorageEngine> {
    engine: Arc<E>,
    txn: Mutex<Option<E::Transaction>>,
}

impl<E: StorageEngine + 'static> EngineAdapter<E> {
    /// Creates a session with no active transaction.
    #[must_use]
    pub fn new(engine: Arc<E>) -> Arc<Self> {
        Arc::new(Self { engine, txn: Mutex::new(None) })
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }
}

impl<E: StorageEngine + 'static> StoreAdapter for EngineAdapter<E> {
    fn begin_transaction(&self, mode: TransactionMode) -> QueryResult<()> {
        let mut slot = self.txn.lock();
        if slot.is_some() {
            return Err(StorageError::Transaction("a transaction is already active".into()).into());
        }
        let txn = match mode {
            TransactionMode::ReadOnly => self.engine.begin_read()?,
            TransactionMode::ReadWrite => self.engine.begin_write()?,
        };
        trace!(?mode, "began transaction");
        *slot = Some(txn);
        Ok(())
    }

    fn commit_transaction(&self) -> QueryResult<()> {
        let txn = self
            .txn
            .lock()
            .take()
            .ok_or_else(|| StorageError::Transaction("no active transaction".into()))?;
        txn.commit()?;
        trace!("committed transaction");
        Ok(())
    }

    fn rollback_transaction(&self) -> QueryResult<()> {
        if let Some(txn) = self.txn.lock().take() {
            txn.rollback()?;
            trace!("rolled back transaction");
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.lock().is_some()
    }

    fn scan(
        &self,
        table: &str,
        range: &KeyRange,
        resume_after: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> QueryResult<Vec<KeyValue>> {
        if let Some(txn) = self.txn.lock().as_ref() {
            return Ok(txn.scan(table, range, resume_after, direction, limit)?);
        }
        Ok(self.engine.begin_read()?.scan(table, range, resume_after, direction, limit)?)
    }

    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> QueryResult<()> {
        if let Some(txn) = self.txn.lock().as_mut() {
            return Ok(txn.put(table, key, value)?);
        }
        let mut txn = self.engine.begin_write()?;
        txn.put(table, key, value)?;
        Ok(txn.commit()?)
    }

    fn derive_session(&self) -> Arc<dyn StoreAdapter> {
        Self::new(Arc::clone(&self.engine))
    }
}

impl<E: StorageEngine> fmt::Debug for EngineAdapter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("in_transaction", &self.txn.lock().is_some())
            .finish_non_exhaustive()
    }
}

/// An owned, batched walk over one key range.
///
/// Keeps only the last key it handed out, so it survives across `next()`
/// calls without borrowing a transaction.
pub struct KeyTraversal {
    adapter: Arc<dyn StoreAdapter>,
    table: String,
    range: KeyRange,
    direction: Direction,
    batch_size: usize,
    batch: VecDeque<KeyValue>,
    last_key: Option<Vec<u8>>,
    exhausted: bool,
}

impl KeyTraversal {
    /// Positions a traversal before the first key of `range` in `direction`.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn StoreAdapter>,
        table: impl Into<String>,
        range: KeyRange,
        direction: Direction,
        batch_size: usize,
    ) -> Self {
        let exhausted = range.is_empty();
        Self {
            adapter,
            table: table.into(),
            range,
            direction,
            batch_size: batch_size.max(1),
            batch: VecDeque::new(),
            last_key: None,
            exhausted,
        }
    }

    /// Steps to the next entry, refilling from storage when the batch runs
    /// out.
    ///
    /// # Errors
    ///
    /// Fails if the storage read fails.
    pub fn next_entry(&mut self) -> QueryResult<Option<KeyValue>> {
        if self.batch.is_empty() && !self.exhausted {
            let fetched = self.adapter.scan(
                &self.table,
                &self.range,
                self.last_key.as_deref(),
                self.direction,
                self.batch_size,
            )?;
            if fetched.len() < self.batch_size {
                self.exhausted = true;
            }
            trace!(table = %self.table, fetched = fetched.len(), "fetched scan batch");
            self.batch.extend(fetched);
        }
        let entry = self.batch.pop_front();
        if let Some((key, _)) = &entry {
            self.last_key = Some(key.clone());
        }
        Ok(entry)
    }
}

impl fmt::Debug for KeyTraversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTraversal")
            .field("table", &self.table)
            .field("range", &self.range)
            .field("direction", &self.direction)
            .field("buffered", &self.batch.len())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::ops::Bound;

    use arbordb_storage::backends::RedbEngine;

    use super::*;

    fn loaded(n: u8) -> Arc<dyn StoreAdapter> {
        let adapter = EngineAdapter::new(Arc::new(RedbEngine::in_memory().unwrap()));
        for i in 0..n {
            adapter.put("t", &[i], &[i]).unwrap();
        }
        adapter
    }

    #[test]
    fn traversal_pages_through_range() {
        let adapter = loaded(10);
        let range = KeyRange::new(Bound::Included(vec![2]), Bound::Excluded(vec![8]));
        let mut walk = KeyTraversal::new(adapter, "t", range, Direction::Forward, 4);
        let mut keys = Vec::new();
        while let Some((key, _)) = walk.next_entry().unwrap() {
            keys.push(key[0]);
        }
        assert_eq!(keys, vec![2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn traversal_backward() {
        let adapter = loaded(5);
        let mut walk = KeyTraversal::new(adapter, "t", KeyRange::all(), Direction::Backward, 2);
        let mut keys = Vec::new();
        while let Some((key, _)) = walk.next_entry().unwrap() {
            keys.push(key[0]);
        }
        assert_eq!(keys, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn transaction_lifecycle() {
        let adapter = loaded(0);
        assert!(!adapter.in_transaction());
        adapter.begin_transaction(TransactionMode::ReadWrite).unwrap();
        assert!(adapter.begin_transaction(TransactionMode::ReadOnly).is_err());
        adapter.put("t", b"k", b"v").unwrap();
        adapter.rollback_transaction().unwrap();
        let all = |a: &dyn StoreAdapter| {
            a.scan("t", &KeyRange::all(), None, Direction::Forward, 10).unwrap()
        };
        assert!(all(adapter.as_ref()).is_empty());

        adapter.begin_transaction(TransactionMode::ReadWrite).unwrap();
        adapter.put("t", b"k", b"v").unwrap();
        adapter.commit_transaction().unwrap();
        assert_eq!(all(adapter.as_ref()).len(), 1);
        assert!(adapter.commit_transaction().is_err());
    }

    #[test]
    fn derived_sessions_are_independent() {
        let adapter = loaded(3);
        adapter.begin_transaction(TransactionMode::ReadOnly).unwrap();
        let derived = adapter.derive_session();
        assert!(!derived.in_transaction());
        let entries = derived.scan("t", &KeyRange::all(), None, Direction::Forward, 10).unwrap();
        assert_eq!(entries.len(), 3);
        adapter.rollback_transaction().unwrap();
    }
}
