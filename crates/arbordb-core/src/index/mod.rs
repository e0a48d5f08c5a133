//! Index metadata.
//!
//! An [`IndexDef`] describes how rows of a table are laid out as ordered keys:
//! which columns participate, in which direction each one sorts, which
//! trailing columns come from the hierarchical key of the table, and whether
//! a group of coordinate columns is collapsed onto a space-filling curve.
//!
//! Index definitions are assembled with an [`IndexBuilder`] and are immutable
//! once built.

mod def;
mod spatial;

pub use def::{ColumnKind, IndexBuilder, IndexColumn, IndexDef, SpatialLayout};
pub use spatial::{Space, LAT_LON_DIMENSIONS};
