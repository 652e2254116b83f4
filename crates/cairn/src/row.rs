//! Row and schema model for the time-series store.
//!
//! A [`Schema`] fixes an ordered list of column names; a [`Row`] carries a
//! timestamp, a 64-bit presence mask, and one value slot per column. Column
//! order is fixed once first written; a schema may only grow by appending
//! names at the end.

use crate::error::{Result, StoreError};

/// Maximum number of columns a schema may declare.
///
/// The on-disk format stores column presence in a single 64-bit mask, which
/// caps schemas at 64 columns. Widening the mask would be a format-version
/// bump.
pub const MAX_COLUMNS: usize = 64;

/// Timestamp type: milliseconds from a caller-defined epoch.
pub type Timestamp = i64;

/// Sentinel `first_time` value for a store that holds no rows.
pub const NO_DATA: Timestamp = i64::MAX;

/// Factor between real timestamps and on-disk coarse time units.
pub const COARSE_FACTOR: i64 = 100;

/// Coarsens a timestamp to on-disk time units.
pub fn deflate(timestamp: Timestamp) -> i64 {
    timestamp / COARSE_FACTOR
}

/// Expands a coarse on-disk time back to a timestamp.
pub fn inflate(coarse: i64) -> Timestamp {
    coarse * COARSE_FACTOR
}

/// Ordered list of column names for a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    /// Creates a schema from column names, in order.
    ///
    /// # Errors
    ///
    /// Returns `TooManyColumns` if more than [`MAX_COLUMNS`] names are given,
    /// and `SchemaMismatch` for an empty list or a name containing a tab or
    /// line break (either would corrupt the text format).
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(StoreError::SchemaMismatch("schema has no columns".into()));
        }
        if columns.len() > MAX_COLUMNS {
            return Err(StoreError::TooManyColumns(columns.len()));
        }
        for name in &columns {
            if name.is_empty() || name.contains(['\t', '\n', '\r']) {
                return Err(StoreError::SchemaMismatch(format!(
                    "invalid column name {name:?}"
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns (never true for a
    /// successfully constructed schema).
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the column names in schema order.
    pub fn names(&self) -> &[String] {
        &self.columns
    }

    /// Returns the index of the named column, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// One sample row: a timestamp, a presence mask, and per-column values.
///
/// Bit `i` of [`bits`](Self::bits) set means column `i` carries a value in
/// [`values`](Self::values); slots whose bit is unset default to `0.0` and
/// have no meaning until a read forward-fills them.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Sample time in milliseconds from the caller's epoch.
    pub timestamp: Timestamp,
    /// Presence mask over the columns.
    pub bits: u64,
    /// Column values, one slot per schema column.
    pub values: Vec<f64>,
}

impl Row {
    /// Creates an empty row (no columns present) for a schema of the given
    /// width.
    pub fn new(timestamp: Timestamp, n_columns: usize) -> Self {
        Self {
            timestamp,
            bits: 0,
            values: vec![0.0; n_columns],
        }
    }

    /// Creates a row from a prebuilt mask and value slots.
    pub fn with_values(timestamp: Timestamp, bits: u64, values: Vec<f64>) -> Self {
        Self {
            timestamp,
            bits,
            values,
        }
    }

    /// Returns true if the column at `index` carries a value.
    pub fn includes(&self, index: usize) -> bool {
        self.bits & (1u64 << index) != 0
    }

    /// Sets the column at `index` to `value` and marks it present.
    pub fn set(&mut self, index: usize, value: f64) {
        self.bits |= 1u64 << index;
        self.values[index] = value;
    }

    /// Marks the column at `index` absent. Its value slot is left alone.
    pub fn clear(&mut self, index: usize) {
        self.bits &= !(1u64 << index);
    }

    /// Merges another row into this one: every column present in `other`
    /// overwrites this row's slot and is marked present. Columns present
    /// only here are kept, and this row's timestamp wins.
    pub fn merge_from(&mut self, other: &Row) {
        let width = self.values.len().min(other.values.len());
        for i in 0..width {
            if other.includes(i) {
                self.set(i, other.values[i]);
            }
        }
    }
}

/// Inclusive time range; either bound may be absent (unbounded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    /// Inclusive lower bound, or `None` for unbounded.
    pub start: Option<Timestamp>,
    /// Inclusive upper bound, or `None` for unbounded.
    pub end: Option<Timestamp>,
}

impl TimeRange {
    /// The unbounded range.
    pub fn all() -> Self {
        Self::default()
    }

    /// Range bounded on both ends, inclusive.
    pub fn between(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Range bounded below only.
    pub fn since(start: Timestamp) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Range bounded above only.
    pub fn until(end: Timestamp) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// Returns true if `t` falls within the range.
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start.is_none_or(|s| t >= s) && self.end.is_none_or(|e| t <= e)
    }
}
