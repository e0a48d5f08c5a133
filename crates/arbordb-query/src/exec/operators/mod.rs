//! Concrete operator implementations.
//!
//! Each module holds a plan type (built through [`Operator`](super::Operator))
//! and the cursor it instantiates.
//!
//! - [`values`] - literal rows
//! - [`index_scan`] - ordered index range scans
//! - [`select`] / [`project`] - streaming filter and projection
//! - [`aggregate`] - grouping over key-ordered input
//! - [`sort`] - bounded top-N sort
//! - [`map_parallel`] - partitioned parallel execution

pub mod aggregate;
pub mod index_scan;
pub mod map_parallel;
pub mod project;
pub mod select;
pub mod sort;
pub mod values;

pub use aggregate::{AggregateCall, AggregateCursor, AggregatePlan};
pub use index_scan::{IndexBound, IndexKeyRange, IndexScanCursor, IndexScanPlan};
pub use map_parallel::{key_range_partitions, MapParallelCursor, MapParallelPlan};
pub use project::{ProjectCursor, ProjectPlan};
pub use select::{SelectCursor, SelectPlan};
pub use sort::{DuplicatePolicy, SortCursor, SortKey, SortPlan};
pub use values::{ValuesCursor, ValuesPlan};

#[cfg(test)]
pub(crate) mod test_support;
