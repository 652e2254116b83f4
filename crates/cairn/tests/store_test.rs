//! End-to-end tests for the store facade: append/merge/flush/stream
//! behavior over real files.

use cairn::{Row, Schema, StoreConfig, TimeRange, TimeSeries, NO_DATA};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Config with the background ticker disabled so tests control exactly
/// when the pending row is emitted.
fn manual_flush() -> StoreConfig {
    StoreConfig {
        force_ordering: false,
        flush_interval: None,
    }
}

fn forced_ordering() -> StoreConfig {
    StoreConfig {
        force_ordering: true,
        flush_interval: None,
    }
}

fn open(dir: &Path, schema: &[&str], config: StoreConfig) -> TimeSeries {
    let schema = Schema::new(schema.iter().copied()).unwrap();
    TimeSeries::open(dir, "test", schema, config).unwrap()
}

fn row(timestamp: i64, bits: u64, values: Vec<f64>) -> Row {
    Row::with_values(timestamp, bits, values)
}

fn records(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("test.pts.data"))
        .unwrap()
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[test]
fn test_empty_store() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x", "y"], manual_flush());

    assert_eq!(store.first_time(), NO_DATA);
    assert!(store.collect(TimeRange::all()).unwrap().is_empty());
}

#[test]
fn test_single_row() {
    let dir = TempDir::new().unwrap();
    let mut store = open(dir.path(), &["x", "y"], manual_flush());

    store.append(row(500, 0b11, vec![1.0, 2.0])).unwrap();
    store.flush().unwrap();

    let recs = records(dir.path());
    assert_eq!(recs.len(), 1);
    let fields: Vec<&str> = recs[0].split('\t').collect();
    assert_eq!(fields[0], "-5");
    assert_eq!(fields[1], "3");
    assert_eq!(fields[2].parse::<f64>().unwrap(), 1.0);
    assert_eq!(fields[3].parse::<f64>().unwrap(), 2.0);

    store.close().unwrap();
    let reopened = open(dir.path(), &["x", "y"], manual_flush());
    assert_eq!(reopened.first_time(), 500);
}

#[test]
fn test_bucket_merge() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x", "y"], manual_flush());

    store.append(row(500, 0b01, vec![1.0, 0.0])).unwrap();
    store.append(row(530, 0b10, vec![0.0, 2.0])).unwrap();
    store.flush().unwrap();

    assert_eq!(records(dir.path()).len(), 1);
    let rows = store.collect(TimeRange::all()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].timestamp, 500);
    assert_eq!(rows[0].bits, 0b11);
    assert_eq!(rows[0].values, vec![1.0, 2.0]);
}

#[test]
fn test_unchanged_token() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x", "y"], manual_flush());

    store.append(row(500, 0b01, vec![1.0, 0.0])).unwrap();
    store.append(row(1500, 0b01, vec![1.0, 0.0])).unwrap();
    store.flush().unwrap();

    let recs = records(dir.path());
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[1].split('\t').nth(2), Some("*"));

    let rows = store.collect(TimeRange::all()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].values, vec![1.0, 0.0]);
    assert_eq!(rows[1].values, vec![1.0, 0.0]);
}

#[test]
fn test_non_finite_dropped() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x", "y"], manual_flush());

    store.append(row(500, 0b01, vec![f64::NAN, 0.0])).unwrap();
    store.flush().unwrap();

    let recs = records(dir.path());
    assert_eq!(recs.len(), 1);
    let fields: Vec<&str> = recs[0].split('\t').collect();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[1], "0");

    let rows = store.collect(TimeRange::all()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].bits, 0);
}

#[test]
fn test_out_of_order_strict() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x"], manual_flush());

    store.append(row(1000, 0b1, vec![1.0])).unwrap();
    store.append(row(900, 0b1, vec![2.0])).unwrap();

    // The late row sits in the pending slot; flushing it is what trips
    // the ordering check.
    let err = store.flush();
    assert!(matches!(err, Err(cairn::StoreError::OutOfOrder { .. })));

    let recs = records(dir.path());
    assert_eq!(recs.len(), 1);
    assert!(recs[0].starts_with("-10\t"));
}

#[test]
fn test_out_of_order_clamped() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x"], forced_ordering());

    store.append(row(1000, 0b1, vec![1.0])).unwrap();
    store.append(row(900, 0b1, vec![2.0])).unwrap();
    store.flush().unwrap();

    let recs = records(dir.path());
    assert_eq!(recs.len(), 2);
    assert!(recs[1].starts_with("0\t"));

    let rows = store.collect(TimeRange::all()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp, 1000);
    assert_eq!(rows[1].timestamp, 1000);
}

#[test]
fn test_range_stream() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x"], manual_flush());

    for i in 1..=5 {
        store.append(row(i * 100, 0b1, vec![i as f64])).unwrap();
    }
    store.flush().unwrap();

    let rows = store.collect(TimeRange::between(250, 450)).unwrap();
    let times: Vec<i64> = rows.iter().map(|r| r.timestamp).collect();
    assert_eq!(times, vec![300, 400]);
}

#[test]
fn test_range_skip_still_forward_fills() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x", "y"], manual_flush());

    store.append(row(100, 0b11, vec![1.0, 5.0])).unwrap();
    store.append(row(200, 0b01, vec![2.0, 0.0])).unwrap();
    store.append(row(300, 0b01, vec![3.0, 0.0])).unwrap();
    store.flush().unwrap();

    // Rows below the range are parsed, not just skipped: the value of y
    // from the first row must survive into the delivered rows.
    let rows = store.collect(TimeRange::since(250)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values, vec![3.0, 5.0]);
}

#[test]
fn test_sink_early_stop() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x"], manual_flush());

    for i in 1..=5 {
        store.append(row(i * 1000, 0b1, vec![i as f64])).unwrap();
    }
    store.flush().unwrap();

    let mut seen = 0;
    store
        .stream(TimeRange::all(), |_| {
            seen += 1;
            seen < 2
        })
        .unwrap();
    assert_eq!(seen, 2);
}

#[test]
fn test_flush_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x"], manual_flush());

    store.append(row(500, 0b1, vec![1.0])).unwrap();
    store.flush().unwrap();
    let after_first = records(dir.path());
    store.flush().unwrap();
    assert_eq!(records(dir.path()), after_first);
}

#[test]
fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut store = open(dir.path(), &["x"], manual_flush());

    store.append(row(500, 0b1, vec![1.0])).unwrap();
    store.close().unwrap();
    store.close().unwrap();

    assert!(matches!(
        store.append(row(600, 0b1, vec![1.0])),
        Err(cairn::StoreError::Closed)
    ));
}

#[test]
fn test_first_time_seeded_by_first_append() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x"], manual_flush());

    assert_eq!(store.first_time(), NO_DATA);
    store.append(row(500, 0b1, vec![1.0])).unwrap();
    assert_eq!(store.first_time(), 500);
}

#[test]
fn test_reopen_continues_log() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open(dir.path(), &["x"], manual_flush());
        store.append(row(500, 0b1, vec![1.0])).unwrap();
        store.close().unwrap();
    }

    let mut store = open(dir.path(), &["x"], manual_flush());
    assert_eq!(store.first_time(), 500);
    store.append(row(2500, 0b1, vec![2.0])).unwrap();
    store.flush().unwrap();

    // The first record of a session re-anchors with an absolute time.
    let recs = records(dir.path());
    assert_eq!(recs.len(), 2);
    assert!(recs[1].starts_with("-25\t"));

    let rows = store.collect(TimeRange::all()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].values, vec![2.0]);
    store.close().unwrap();
}

#[test]
fn test_reopen_never_reuses_stale_unchanged_state() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open(dir.path(), &["x", "y"], manual_flush());
        store.append(row(500, 0b10, vec![0.0, 7.0])).unwrap();
        store.close().unwrap();
    }

    // After reopen the writer knows nothing about on-disk values; a 0.0
    // for y must be written literally, not as "*".
    let mut store = open(dir.path(), &["x", "y"], manual_flush());
    store.append(row(2500, 0b10, vec![0.0, 0.0])).unwrap();
    store.flush().unwrap();

    let rows = store.collect(TimeRange::all()).unwrap();
    assert_eq!(rows[1].values[1], 0.0);
    store.close().unwrap();
}

#[test]
fn test_row_width_mismatch_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), &["x", "y"], manual_flush());
    assert!(matches!(
        store.append(row(500, 0b1, vec![1.0])),
        Err(cairn::StoreError::SchemaMismatch(_))
    ));
}

#[test]
fn test_background_flush_makes_rows_visible() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        force_ordering: false,
        flush_interval: Some(Duration::from_millis(10)),
    };
    let mut store = open_with(dir.path(), config);

    store.append(row(500, 0b1, vec![1.0])).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while records(dir.path()).is_empty() {
        assert!(
            std::time::Instant::now() < deadline,
            "background flush never emitted the pending row"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
    store.close().unwrap();
}

fn open_with(dir: &Path, config: StoreConfig) -> TimeSeries {
    let schema = Schema::new(["x"]).unwrap();
    TimeSeries::open(dir, "test", schema, config).unwrap()
}

#[test]
fn test_legacy_drop_token_read() {
    let dir = TempDir::new().unwrap();
    // Older writers emitted "!" tokens for non-finite values instead of
    // clearing the bit at write time; reading them must still work.
    std::fs::write(dir.path().join("test.pts.hdr"), "1\nx\ty\n").unwrap();
    std::fs::write(
        dir.path().join("test.pts.data"),
        "# legacy\n-5\t3\t1\t2\n10\t3\t!\t4\n",
    )
    .unwrap();

    let store = open(dir.path(), &["x", "y"], manual_flush());
    let rows = store.collect(TimeRange::all()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].bits, 0b10);
    assert_eq!(rows[1].values, vec![1.0, 4.0]);
}
