//! Cairn - append-only persistent time-series row store.
//!
//! A store is a pair of text files: a header describing the schema and a
//! data file holding one record per line. Rows are wide, sparse, and
//! numerically valued; timestamps are delta-encoded in coarse units with an
//! absolute-reset escape, column presence is a 64-bit mask, and value
//! tokens can say "unchanged since last" or "drop this column". Reads
//! stream the log back in time order with every column forward-filled.
//!
//! # Components
//!
//! - [`Schema`] / [`Row`]: the row model (names, presence mask, values)
//! - [`TimeSeries`]: the store facade (`append`, `stream`, `flush`, `close`)
//! - [`codec`]: the line format and its stateful encoder/decoder pair
//! - [`repo`]: header/data file lifecycle and validation
//!
//! # Example
//!
//! ```rust,ignore
//! use cairn::{Row, Schema, StoreConfig, TimeRange, TimeSeries};
//!
//! let schema = Schema::new(["speed", "power"])?;
//! let mut store = TimeSeries::open(dir, "drive", schema, StoreConfig::default())?;
//!
//! let mut row = Row::new(now_ms, 2);
//! row.set(0, 88.0);
//! store.append(row)?;
//! store.flush()?;
//!
//! store.stream(TimeRange::all(), |row| {
//!     println!("{} {:?}", row.timestamp, row.values);
//!     true
//! })?;
//! store.close()?;
//! ```

#![deny(missing_docs)]

pub mod codec;
pub mod emitter;
pub mod error;
pub mod repo;
pub mod row;
pub mod store;
pub mod ticker;

pub use error::{Result, StoreError};
pub use repo::{Repo, REPO_VERSION};
pub use row::{
    deflate, inflate, Row, Schema, TimeRange, Timestamp, COARSE_FACTOR, MAX_COLUMNS, NO_DATA,
};
pub use store::{StoreConfig, TimeSeries, DEFAULT_FLUSH_INTERVAL};
