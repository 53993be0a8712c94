#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
/*!
 * # datable
 * _columnar data shaping for charts_. An in-memory tabular data engine written in Rust.
 *
 * Datable models a table as a [`Dataset`]: an ordered, immutable collection of
 * uniquely-named [`Field`]s (typed columns) sharing one row count. Fields compute
 * descriptive statistics lazily and cache them, and the dataset exposes a pipeline
 * of composable transforms — filter, sort, bin, rank, stack, summarize, series
 * pivoting — each of which returns a *new* dataset and never mutates its input.
 *
 * ## Get started
 *
 * ```
 * use datable::{Dataset, io};
 *
 * let csv = "region,sales\nEast,100\nWest,250\nEast,80\n";
 * let fields = io::csv::read(csv).unwrap();
 * let data = Dataset::make(fields, true);
 *
 * // Aggregate sales by region, then sort regions by their total
 * let by_region = data
 *     .summarize("region=region; sales=sales:sum")
 *     .unwrap()
 *     .sort("sales")
 *     .unwrap();
 *
 * assert_eq!(by_region.row_count(), 2);
 * ```
 *
 * ## Notes about datable's design
 *
 * The engine is single-threaded and purely synchronous. Every transform is a
 * total function from dataset to dataset with no I/O; the only caches are the
 * populate-once statistics inside each field, and the only sanctioned in-place
 * mutation is the interactive `#selection` column (see [`Dataset::modify_selection`]).
 *
 * Three synthetic fields ride along with every dataset: `#count` (constant 1),
 * `#row` (1-based row index) and `#selection` (a two-state selection glyph).
 * Ordinary transforms never remove them.
 *
 * Axis scales and "nice" tick sequences for linear, logarithmic and calendar
 * domains are generated by the [`auto`] module, which also hosts the automatic
 * per-field type conversion used by [`Dataset::make`].
 *
 * External I/O lives in [`io`]: a separator-detecting CSV reader and a compact
 * self-describing binary codec for round-tripping datasets.
 */

use std::fmt;

pub mod auto;
pub mod dataset;
pub mod field;
pub mod io;
pub mod provider;
pub mod stats;
pub mod time;
pub mod transform;
pub mod value;

pub use dataset::Dataset;
pub use field::Field;
pub use provider::Provider;
pub use time::{Date, DateFormat, DateUnit};
pub use value::{Range, Value, ValueList};

/// Errors raised by dataset transforms and the I/O boundary.
///
/// Soft conditions (empty commands, zero-row datasets, filters removing
/// nothing) are not errors; they return the input dataset unchanged.
#[derive(Debug, Clone)]
pub enum Error {
    /// A transform command referenced a field that is not in the dataset
    FieldNotFound(String),
    /// A transform command could not be parsed
    BadCommand(String),
    /// CSV input was malformed
    Csv {
        /// 1-based line at which the problem was found
        line: usize,
        /// what went wrong
        reason: String,
    },
    /// Binary data could not be decoded
    Codec(String),
    /// Binary data was written by an incompatible serializer version
    BadVersion {
        /// version found in the data
        found: u32,
        /// version this build reads and writes
        expected: u32,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FieldNotFound(name) => write!(f, "field not found: {name}"),
            Error::BadCommand(reason) => write!(f, "bad transform command: {reason}"),
            Error::Csv { line, reason } => write!(f, "CSV error at line {line}: {reason}"),
            Error::Codec(reason) => write!(f, "corrupt serialized data: {reason}"),
            Error::BadVersion { found, expected } => {
                write!(f, "serialized version {found} differs from expected {expected}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
pub(crate) mod tests {
    pub trait Near {
        fn near_abs(&self, other: &Self, tol: f64) -> bool;
    }

    impl Near for f64 {
        fn near_abs(&self, other: &Self, tol: f64) -> bool {
            (self - other).abs() <= tol
        }
    }

    macro_rules! assert_near {
        ($a:expr, $b:expr, $tol:expr) => {
            assert!(
                $a.near_abs(&$b, $tol),
                "Assertion failed: Values are not close enough.\nValue 1: {:?}\nValue 2: {:?}\nTolerance: {}",
                $a,
                $b,
                $tol
            );
        };
        ($a:expr, $b:expr) => {
            assert_near!($a, $b, 1e-8);
        };
    }

    pub(crate) use assert_near;

    #[test]
    fn test_near() {
        let a = 1.0;
        let b = 1.0 + 1e-9;
        assert_near!(a, b);
        assert!(!a.near_abs(&b, 1e-10));
    }
}
