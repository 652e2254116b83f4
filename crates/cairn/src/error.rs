//! Error and Result types for store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The error type for persistent time-series operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Header column names do not match the caller's schema, or the header
    /// declares more columns than the schema supplies.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A data file exists without its header file. The data is valuable and
    /// its schema cannot be assumed, so the store refuses to open.
    #[error("Data file without header file: {0}")]
    DataWithoutHeader(PathBuf),

    /// Header written by a newer implementation than this one.
    #[error("Unsupported repository version: {0}")]
    UnsupportedVersion(u32),

    /// Schema declares more columns than the 64-bit presence mask can hold.
    #[error("Too many columns: {0} (max 64)")]
    TooManyColumns(usize),

    /// Incoming row precedes the last emitted row and ordering is strict.
    #[error("Timestamps out of sequence: {incoming} after {last}")]
    OutOfOrder {
        /// Timestamp of the rejected row.
        incoming: i64,
        /// Timestamp of the last emitted row, coarsened to its on-disk bucket.
        last: i64,
    },

    /// Operation attempted on a closed store.
    #[error("Store is closed")]
    Closed,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
