//! Record emission with monotonic-time enforcement.

use crate::codec::RecordEncoder;
use crate::error::{Result, StoreError};
use crate::repo::Repo;
use crate::row::{deflate, inflate, Row};
use tracing::trace;

/// Writes rows to the data file in time order.
///
/// The emitter owns the on-disk coarse-time accumulator: the same running
/// value a decoder rebuilds while reading the file. The first record is
/// written as a negative absolute coarse time; every later record carries a
/// non-negative delta. A row that would need a negative delta is either
/// clamped onto the previous coarse bucket (forced ordering) or rejected
/// without writing anything.
#[derive(Debug)]
pub struct Emitter {
    encoder: RecordEncoder,
    last_coarse: Option<i64>,
    force_ordering: bool,
}

impl Emitter {
    /// Creates an emitter for a schema of the given width.
    pub fn new(n_columns: usize, force_ordering: bool) -> Self {
        Self {
            encoder: RecordEncoder::new(n_columns),
            last_coarse: None,
            force_ordering,
        }
    }

    /// Emits one row through the repository's append handle.
    ///
    /// # Errors
    ///
    /// Returns `OutOfOrder` when the row precedes the last emitted row and
    /// ordering is strict; nothing is written and the emitter state is
    /// untouched, so the store remains usable.
    pub fn emit(&mut self, repo: &mut Repo, row: &Row) -> Result<()> {
        let coarse = deflate(row.timestamp);
        let (time_field, next_coarse) = match self.last_coarse {
            None => (-coarse, coarse),
            Some(last) => {
                let delta = coarse - last;
                if delta >= 0 {
                    (delta, coarse)
                } else if self.force_ordering {
                    trace!(
                        incoming = row.timestamp,
                        clamped_to = inflate(last),
                        "forcing timestamp into sequence"
                    );
                    // Land on the previous bucket; the accumulator must not
                    // move or later deltas would drift.
                    (0, last)
                } else {
                    return Err(StoreError::OutOfOrder {
                        incoming: row.timestamp,
                        last: inflate(last),
                    });
                }
            }
        };

        let line = self.encoder.render(time_field, row);
        repo.append_line(&line)?;
        self.last_coarse = Some(next_coarse);
        Ok(())
    }
}
