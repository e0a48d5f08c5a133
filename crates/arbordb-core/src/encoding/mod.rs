//! Key encoding for index storage.
//!
//! Index keys are concatenations of per-column encodings produced by
//! [`sortable`]. Comparing two encoded keys byte by byte yields the same
//! result as comparing the column values in index order, which lets the
//! storage layer answer range scans without decoding.

pub mod sortable;


pub use sortable::{
    decode_sortable, decode_sortable_with_len, encode_sortable, encode_sortable_into,
    prefix_successor,
};
