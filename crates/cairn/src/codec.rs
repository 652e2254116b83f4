//! Line codec for the on-disk text format.
//!
//! The data file is a sequence of LF-terminated lines. Lines starting with
//! `#` are comments. Every other line is a record:
//!
//! ```text
//! record := timestamp TAB hexbits ( TAB token )*
//! token  := "*" | "!" | double
//! ```
//!
//! - `timestamp` is a signed integer in coarse units. Positive means a delta
//!   added to the previous record's accumulated coarse time; negative means
//!   an absolute coarse time of the same magnitude, re-anchoring the
//!   accumulator. The first record of a file is written absolute.
//! - `hexbits` is the unpadded lowercase hex of the 64-bit presence mask.
//!   A `0x` prefix is tolerated on read.
//! - One token per set bit, in ascending bit order. `*` repeats the
//!   column's last emitted value, `!` drops the bit from the decoded mask,
//!   and anything else parses as a double.
//!
//! [`RecordEncoder`] and [`RecordDecoder`] are stateful pairs: the encoder
//! mirrors the accumulator the decoder will rebuild, which is what lets it
//! choose `*` tokens safely.

use crate::row::{inflate, Row};
use std::fmt::Write as _;
use tracing::warn;

/// Token marking a value identical to the column's last emitted value.
const UNCHANGED: &str = "*";
/// Token marking a value to drop from the decoded presence mask.
const DROPPED: &str = "!";

/// Renders rows into record lines.
///
/// Keeps a per-column mirror of the decoder's forward-fill accumulator so
/// that `*` is only emitted when the decoder is guaranteed to reproduce the
/// exact value. A column qualifies once this encoder has written a numeric
/// token for it; comparison is bit-exact (`f64::to_bits`), matching the
/// round-trip guarantee of the format.
#[derive(Debug)]
pub struct RecordEncoder {
    accumulator: Vec<f64>,
    seeded: u64,
}

impl RecordEncoder {
    /// Creates an encoder for a schema of the given width.
    pub fn new(n_columns: usize) -> Self {
        Self {
            accumulator: vec![0.0; n_columns],
            seeded: 0,
        }
    }

    /// Renders one record line, without the trailing newline.
    ///
    /// `time_field` is the already-adjusted timestamp field; absolute versus
    /// delta is the emitter's call. The row must carry one value slot per
    /// schema column. Columns whose value is non-finite are dropped from
    /// the written mask and contribute no token, so a record never carries
    /// NaN or infinity.
    pub fn render(&mut self, time_field: i64, row: &Row) -> String {
        let mut written = 0u64;
        for i in 0..self.accumulator.len() {
            if row.includes(i) && row.values[i].is_finite() {
                written |= 1u64 << i;
            }
        }

        let mut line = format!("{time_field}\t{written:x}");
        for i in 0..self.accumulator.len() {
            if written & (1u64 << i) == 0 {
                continue;
            }
            let value = row.values[i];
            line.push('\t');
            if self.seeded & (1u64 << i) != 0
                && value.to_bits() == self.accumulator[i].to_bits()
            {
                line.push_str(UNCHANGED);
            } else {
                self.accumulator[i] = value;
                self.seeded |= 1u64 << i;
                let _ = write!(line, "{value}");
            }
        }
        line
    }
}

/// Streaming decoder for data-file lines.
///
/// Holds the coarse-time accumulator and the per-column value accumulator
/// across lines. Decoded rows are dense: every column slot carries the most
/// recent known value whether or not this record set its bit, so readers
/// see a forward-filled view over the sparse log.
///
/// Malformed lines are skipped with a warning and never disturb the value
/// accumulator; the caller keeps streaming.
#[derive(Debug)]
pub struct RecordDecoder {
    n_columns: usize,
    prev_coarse: i64,
    accumulator: Vec<f64>,
}

impl RecordDecoder {
    /// Creates a decoder for a schema of the given width.
    pub fn new(n_columns: usize) -> Self {
        Self {
            n_columns,
            prev_coarse: 0,
            accumulator: vec![0.0; n_columns],
        }
    }

    /// Decodes one line, advancing the accumulators.
    ///
    /// Returns `None` for comments and for malformed lines (logged at
    /// warning level).
    pub fn decode_line(&mut self, line: &str) -> Option<Row> {
        if line.starts_with('#') {
            return None;
        }

        let mut fields = line.split('\t');

        let time_field = fields.next().unwrap_or("");
        let Ok(raw_time) = time_field.parse::<i64>() else {
            warn!(field = time_field, "unparseable timestamp field, skipping line");
            return None;
        };
        let coarse = if raw_time < 0 {
            match raw_time.checked_neg() {
                Some(t) => t,
                None => {
                    warn!(field = time_field, "timestamp field out of range, skipping line");
                    return None;
                }
            }
        } else {
            match raw_time.checked_add(self.prev_coarse) {
                Some(t) => t,
                None => {
                    warn!(field = time_field, "timestamp field out of range, skipping line");
                    return None;
                }
            }
        };
        self.prev_coarse = coarse;

        let Some(bits_field) = fields.next() else {
            warn!("record has no bitvector field, skipping line");
            return None;
        };
        let Some(bits) = parse_bits(bits_field) else {
            warn!(field = bits_field, "unparseable bitvector field, skipping line");
            return None;
        };
        if self.n_columns < 64 && bits >> self.n_columns != 0 {
            warn!(
                field = bits_field,
                columns = self.n_columns,
                "bitvector wider than schema, skipping line"
            );
            return None;
        }

        // Validate the token count before touching the accumulator so a
        // truncated line cannot half-apply.
        let tokens: Vec<&str> = fields.collect();
        if tokens.len() != bits.count_ones() as usize {
            warn!(
                expected = bits.count_ones(),
                got = tokens.len(),
                "token count does not match bitvector, skipping line"
            );
            return None;
        }

        let mut row = Row::new(inflate(coarse), self.n_columns);
        row.bits = bits;
        let mut next_token = 0;
        for i in 0..self.n_columns {
            row.values[i] = self.accumulator[i];
            if bits & (1u64 << i) == 0 {
                continue;
            }
            let token = tokens[next_token];
            next_token += 1;
            match token {
                UNCHANGED => {}
                DROPPED => row.clear(i),
                _ => match token.parse::<f64>() {
                    Ok(value) => {
                        self.accumulator[i] = value;
                        row.values[i] = value;
                    }
                    Err(_) => {
                        warn!(token, column = i, "unparseable value token, dropping column");
                        row.clear(i);
                    }
                },
            }
        }
        Some(row)
    }
}

/// Parses the hex presence mask, tolerating a `0x`/`0X` prefix.
fn parse_bits(field: &str) -> Option<u64> {
    let hex = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u64::from_str_radix(hex, 16).ok()
}
