//! Execution context for query execution.
//!
//! A [`QueryContext`] is the per-execution environment: the storage session,
//! the cancellation signal, runtime configuration and shared statistics.
//! Partition workers receive a derived context with their own session and a
//! child cancellation token.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::adapter::{StoreAdapter, TransactionMode};
use crate::error::{QueryError, QueryResult};

/// Default maximum number of rows an operator may buffer.
pub const DEFAULT_MAX_ROWS_IN_MEMORY: usize = 1_000_000;

/// Execution context for a query.
pub struct QueryContext {
    adapter: Arc<dyn StoreAdapter>,
    cancellation: CancellationToken,
    config: ExecutionConfig,
    stats: Arc<ExecutionStats>,
}

impl QueryContext {
    /// Creates a context over `adapter` with default configuration.
    #[must_use]
    pub fn new(adapter: Arc<dyn StoreAdapter>) -> Arc<Self> {
        Self::with_config(adapter, ExecutionConfig::default())
    }

    /// Creates a context over `adapter` with `config`.
    #[must_use]
    pub fn with_config(adapter: Arc<dyn StoreAdapter>, config: ExecutionConfig) -> Arc<Self> {
        Arc::new(Self {
            adapter,
            cancellation: CancellationToken::new(),
            config,
            stats: Arc::new(ExecutionStats::new()),
        })
    }

    /// Creates a worker context: a fresh storage session, the given
    /// cancellation token, and the same configuration and statistics.
    ///
    /// # Errors
    ///
    /// Fails with [`QueryError::Cancelled`] if this context is already
    /// cancelled.
    pub fn derive(&self, cancellation: CancellationToken) -> QueryResult<Arc<Self>> {
        self.check_cancelled()?;
        Ok(Arc::new(Self {
            adapter: self.adapter.derive_session(),
            cancellation,
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }

    /// The storage session.
    #[inline]
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn StoreAdapter> {
        &self.adapter
    }

    /// Requests cancellation of this execution and everything derived from it.
    #[inline]
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Checks if cancellation was requested.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with [`QueryError::Cancelled`] once cancellation was requested.
    ///
    /// # Errors
    ///
    /// See above.
    #[inline]
    pub fn check_cancelled(&self) -> QueryResult<()> {
        if self.is_cancelled() {
            Err(QueryError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The cancellation token of this context.
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Returns the execution statistics.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Records rows read from storage.
    #[inline]
    pub fn record_rows_read(&self, count: u64) {
        self.stats.rows_read.fetch_add(count, Ordering::Relaxed);
    }

    /// Records rows returned to the top-level caller.
    #[inline]
    pub fn record_rows_produced(&self, count: u64) {
        self.stats.rows_produced.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_worker_started(&self) {
        self.stats.workers_started.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_worker_finished(&self) {
        self.stats.workers_finished.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("cancelled", &self.is_cancelled())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Statistics collected during query execution.
#[derive(Debug)]
pub struct ExecutionStats {
    start_time: Instant,
    rows_read: AtomicU64,
    rows_produced: AtomicU64,
    workers_started: AtomicU64,
    workers_finished: AtomicU64,
}

impl ExecutionStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rows_read: AtomicU64::new(0),
            rows_produced: AtomicU64::new(0),
            workers_started: AtomicU64::new(0),
            workers_finished: AtomicU64::new(0),
        }
    }

    /// Index entries read by scans.
    #[inline]
    #[must_use]
    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    /// Rows handed to the top-level caller.
    #[inline]
    #[must_use]
    pub fn rows_produced(&self) -> u64 {
        self.rows_produced.load(Ordering::Relaxed)
    }

    /// Partition worker threads spawned.
    #[inline]
    #[must_use]
    pub fn workers_started(&self) -> u64 {
        self.workers_started.load(Ordering::SeqCst)
    }

    /// Partition worker threads that ran to completion.
    #[inline]
    #[must_use]
    pub fn workers_finished(&self) -> u64 {
        self.workers_finished.load(Ordering::SeqCst)
    }

    /// Time since the statistics were created.
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for ExecutionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for query execution.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Entries fetched per storage round trip.
    pub scan_batch_size: usize,
    /// Bound of the partition row channel.
    pub channel_capacity: usize,
    /// How long a blocked consumer waits before re-checking cancellation.
    pub poll_interval: Duration,
    /// Maximum rows an operator may buffer (0 = unlimited).
    pub max_rows_in_memory: usize,
    /// Transaction mode partition workers begin with.
    pub transaction_mode: TransactionMode,
}

impl ExecutionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scan_batch_size: 256,
            channel_capacity: 64,
            poll_interval: Duration::from_millis(10),
            max_rows_in_memory: DEFAULT_MAX_ROWS_IN_MEMORY,
            transaction_mode: TransactionMode::ReadOnly,
        }
    }

    /// Sets the scan batch size.
    #[must_use]
    pub const fn with_scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }

    /// Sets the partition channel capacity.
    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Sets the consumer poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum number of buffered rows.
    #[must_use]
    pub const fn with_max_rows_in_memory(mut self, limit: usize) -> Self {
        self.max_rows_in_memory = limit;
        self
    }

    /// Sets the worker transaction mode.
    #[must_use]
    pub const fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle for cancelling query execution.
///
/// Tokens form a tree: cancelling a token cancels every child derived from
/// it, never its parent.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug)]
struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<Arc<TokenInner>>,
}

impl CancellationToken {
    /// Creates a new root token.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(TokenInner { cancelled: AtomicBool::new(false), parent: None }) }
    }

    /// Creates a token cancelled by this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(Arc::clone(&self.inner)),
            }),
        }
    }

    /// Cancels this token and its descendants.
    #[inline]
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Checks if this token or an ancestor was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let mut node = Some(&self.inner);
        while let Some(inner) = node {
            if inner.cancelled.load(Ordering::SeqCst) {
                return true;
            }
            node = inner.parent.as_ref();
        }
        false
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
