//! Public store facade.
//!
//! [`TimeSeries`] ties the pieces together: the repository owns the files,
//! the emitter enforces ordering and renders records, a single pending-row
//! slot coalesces samples that share a coarse time bucket, and a background
//! ticker flushes periodically. All mutating operations, the open-time scan,
//! and streaming share one mutex, so appenders, the ticker, and readers
//! never interleave mid-operation.

use crate::codec::RecordDecoder;
use crate::emitter::Emitter;
use crate::error::{Result, StoreError};
use crate::repo::Repo;
use crate::row::{deflate, Row, Schema, TimeRange, Timestamp, NO_DATA};
use crate::ticker::Ticker;
use std::io::BufRead;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error};

/// Default interval between background flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(20);

/// Configuration for a [`TimeSeries`] store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Clamp out-of-order timestamps onto the previous coarse bucket
    /// instead of rejecting them with `OutOfOrder`.
    pub force_ordering: bool,
    /// Interval between background flushes, or `None` to disable the
    /// ticker and leave flushing to the caller.
    pub flush_interval: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            force_ordering: false,
            flush_interval: Some(DEFAULT_FLUSH_INTERVAL),
        }
    }
}

struct Inner {
    repo: Repo,
    emitter: Emitter,
    pending: Option<Row>,
    first_time: Timestamp,
    closed: bool,
}

/// A persistent time-series store over one header/data file pair.
///
/// Rows appended in program order land in the log in that order; two rows
/// whose coarsened timestamps are equal are merged into one record. Reads
/// stream the log back in time order with every column forward-filled to
/// its last known value.
pub struct TimeSeries {
    schema: Schema,
    inner: Arc<Mutex<Inner>>,
    ticker: Option<Ticker>,
}

impl TimeSeries {
    /// Returns true iff a repository for `base` already exists in
    /// `container`.
    pub fn exists(container: &Path, base: &str) -> bool {
        Repo::exists(container, base)
    }

    /// Opens (creating if needed) the store and scans it for its oldest
    /// row before the background ticker starts.
    ///
    /// # Errors
    ///
    /// Fails on header/schema disagreements, an orphaned data file, a
    /// newer format version, or I/O errors. The validation failures
    /// create no files.
    pub fn open(
        container: &Path,
        base: &str,
        schema: Schema,
        config: StoreConfig,
    ) -> Result<Self> {
        let repo = Repo::open(container, base, &schema)?;
        let emitter = Emitter::new(schema.len(), config.force_ordering);
        let inner = Arc::new(Mutex::new(Inner {
            repo,
            emitter,
            pending: None,
            first_time: NO_DATA,
            closed: false,
        }));

        {
            let mut guard = lock(&inner);
            let mut first = NO_DATA;
            stream_locked(&mut guard, schema.len(), TimeRange::all(), &mut |row| {
                first = row.timestamp;
                false
            })?;
            guard.first_time = first;
        }

        let ticker = config.flush_interval.map(|interval| {
            let task_inner = Arc::clone(&inner);
            Ticker::spawn(interval, move || {
                let mut guard = lock(&task_inner);
                if guard.closed {
                    return;
                }
                if let Err(err) = flush_locked(&mut guard) {
                    error!(error = %err, "background flush failed");
                }
            })
        });

        Ok(Self {
            schema,
            inner,
            ticker,
        })
    }

    /// Returns the schema this store was opened with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the timestamp of the oldest row, or [`NO_DATA`] if the
    /// store has never held one.
    pub fn first_time(&self) -> Timestamp {
        lock(&self.inner).first_time
    }

    /// Appends one row.
    ///
    /// The row is parked in the pending slot; a later row in the same
    /// coarse bucket merges into it, and a row in a new bucket pushes the
    /// pending row out to the log. Nothing is readable until a flush.
    ///
    /// # Errors
    ///
    /// `OutOfOrder` if emitting the pending row would move time backwards
    /// under strict ordering; the pending slot is left unchanged and the
    /// store stays usable. `SchemaMismatch` if the row width disagrees
    /// with the schema.
    pub fn append(&self, row: Row) -> Result<()> {
        if row.values.len() != self.schema.len() {
            return Err(StoreError::SchemaMismatch(format!(
                "row has {} value slots, schema has {} columns",
                row.values.len(),
                self.schema.len()
            )));
        }
        let mut guard = lock(&self.inner);
        if guard.closed {
            return Err(StoreError::Closed);
        }
        append_locked(&mut guard, row)
    }

    /// Streams decoded rows within `range` to `sink`, oldest first.
    ///
    /// The sink returns `true` to continue; `false` stops immediately and
    /// releases the reader. Rows below the range still feed the
    /// forward-fill accumulator; the first row above it ends the scan.
    /// Only flushed data is visible. The sink runs under the store lock
    /// and must not call back into the store.
    ///
    /// # Errors
    ///
    /// Surfaces I/O errors from the underlying reader.
    pub fn stream<F>(&self, range: TimeRange, mut sink: F) -> Result<()>
    where
        F: FnMut(&Row) -> bool,
    {
        let mut guard = lock(&self.inner);
        if guard.closed {
            return Err(StoreError::Closed);
        }
        stream_locked(&mut guard, self.schema.len(), range, &mut sink)
    }

    /// Collects the rows within `range` into a vector.
    pub fn collect(&self, range: TimeRange) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        self.stream(range, |row| {
            rows.push(row.clone());
            true
        })?;
        Ok(rows)
    }

    /// Emits the pending row (if any) and pushes buffered bytes to the OS.
    ///
    /// Safe to call at any time; flushing twice is the same as flushing
    /// once. If emitting the pending row fails, previously written records
    /// are still flushed before the error surfaces.
    pub fn flush(&self) -> Result<()> {
        let mut guard = lock(&self.inner);
        if guard.closed {
            return Err(StoreError::Closed);
        }
        flush_locked(&mut guard)
    }

    /// Cancels the ticker, flushes, and releases the file handles.
    ///
    /// Idempotent; a second close is a no-op. Later operations fail with
    /// `Closed`.
    pub fn close(&mut self) -> Result<()> {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        let mut guard = lock(&self.inner);
        if guard.closed {
            return Ok(());
        }
        let flushed = flush_locked(&mut guard);
        guard.closed = true;
        guard.repo.close()?;
        flushed
    }
}

impl Drop for TimeSeries {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        let mut guard = lock(&self.inner);
        if !guard.closed {
            if let Err(err) = flush_locked(&mut guard) {
                error!(error = %err, "flush on drop failed");
            }
            guard.closed = true;
            let _ = guard.repo.close();
        }
    }
}

fn lock(inner: &Arc<Mutex<Inner>>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|err| err.into_inner())
}

fn append_locked(inner: &mut Inner, row: Row) -> Result<()> {
    if inner.first_time == NO_DATA {
        inner.first_time = row.timestamp;
    }
    match inner.pending.take() {
        None => {
            inner.pending = Some(row);
            Ok(())
        }
        Some(mut pending) => {
            if deflate(row.timestamp) == deflate(pending.timestamp) {
                debug!(bucket = deflate(row.timestamp), "merging rows in coarse bucket");
                pending.merge_from(&row);
                inner.pending = Some(pending);
                Ok(())
            } else {
                if let Err(err) = inner.emitter.emit(&mut inner.repo, &pending) {
                    inner.pending = Some(pending);
                    return Err(err);
                }
                inner.pending = Some(row);
                Ok(())
            }
        }
    }
}

fn flush_locked(inner: &mut Inner) -> Result<()> {
    let emitted = match inner.pending.take() {
        Some(pending) => match inner.emitter.emit(&mut inner.repo, &pending) {
            Ok(()) => Ok(()),
            Err(err) => {
                inner.pending = Some(pending);
                Err(err)
            }
        },
        None => Ok(()),
    };
    inner.repo.flush()?;
    emitted
}

fn stream_locked(
    inner: &mut Inner,
    n_columns: usize,
    range: TimeRange,
    sink: &mut dyn FnMut(&Row) -> bool,
) -> Result<()> {
    let reader = inner.repo.reader()?;
    let mut decoder = RecordDecoder::new(n_columns);
    for line in reader.lines() {
        let line = line?;
        let Some(row) = decoder.decode_line(&line) else {
            continue;
        };
        if let Some(start) = range.start {
            if row.timestamp < start {
                continue;
            }
        }
        if let Some(end) = range.end {
            if row.timestamp > end {
                break;
            }
        }
        if !sink(&row) {
            break;
        }
    }
    Ok(())
}
