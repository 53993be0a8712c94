//! The external I/O boundary: CSV ingestion and a compact binary codec.
//!
//! [`csv`] turns delimited text into raw fields ready for
//! [`Dataset::make`](crate::Dataset::make); [`serialize`] round-trips a
//! dataset through a self-describing byte format with dictionary-encoded
//! columns.

pub mod csv;
pub mod serialize;
