//! Header/data file pair backing a store.
//!
//! A repository is two text files inside a container directory:
//!
//! - `<base>.pts.hdr` — two lines: format version, then the tab-joined
//!   column names in schema order.
//! - `<base>.pts.data` — optional `#` comment lines, then one record per
//!   line (see [`crate::codec`]).
//!
//! Both are created lazily at open. The header is rewritten only when the
//! caller's schema appends new columns to the end of the on-disk list; any
//! other disagreement is fatal, as is a data file that has lost its header.

use crate::error::{Result, StoreError};
use crate::row::Schema;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Current repository format version.
///
/// Opening a header written by a newer implementation fails; writing always
/// writes this version.
pub const REPO_VERSION: u32 = 1;

/// Header file suffix.
const HEADER_SUFFIX: &str = ".pts.hdr";
/// Data file suffix.
const DATA_SUFFIX: &str = ".pts.data";

/// The header/data file pair and its append handle.
#[derive(Debug)]
pub struct Repo {
    data_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl Repo {
    /// Returns true iff both repository files exist.
    pub fn exists(container: &Path, base: &str) -> bool {
        header_path(container, base).exists() && data_path(container, base).exists()
    }

    /// Opens (creating if needed) the repository for the given schema.
    ///
    /// # Errors
    ///
    /// - `DataWithoutHeader` if the data file exists but the header does not.
    /// - `UnsupportedVersion` if the header was written by a newer version.
    /// - `SchemaMismatch` if the header's names do not prefix-match the
    ///   schema, or declare more columns than the schema supplies.
    pub fn open(container: &Path, base: &str, schema: &Schema) -> Result<Self> {
        fs::create_dir_all(container)?;
        let header_path = header_path(container, base);
        let data_path = data_path(container, base);

        if data_path.exists() && !header_path.exists() {
            // The data is valuable and its schema cannot be assumed.
            return Err(StoreError::DataWithoutHeader(data_path));
        }

        ensure_valid_header(&header_path, schema)?;

        if !data_path.exists() {
            create_data_file(&data_path)?;
        }

        let file = OpenOptions::new().append(true).open(&data_path)?;
        Ok(Self {
            data_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Appends one record line; the trailing newline is added here.
    pub fn append_line(&mut self, line: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(StoreError::Closed)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Opens a fresh sequential reader over the data file.
    ///
    /// Readers see data only up to what has been flushed to the OS.
    pub fn reader(&self) -> Result<BufReader<File>> {
        Ok(BufReader::new(File::open(&self.data_path)?))
    }

    /// Pushes buffered bytes to the operating system.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Flushes and releases the append handle. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

fn header_path(container: &Path, base: &str) -> PathBuf {
    container.join(format!("{base}{HEADER_SUFFIX}"))
}

fn data_path(container: &Path, base: &str) -> PathBuf {
    container.join(format!("{base}{DATA_SUFFIX}"))
}

/// Validates an existing header against the schema, creating or extending
/// it where the rules allow.
fn ensure_valid_header(path: &Path, schema: &Schema) -> Result<()> {
    if !path.exists() {
        return write_header(path, schema);
    }

    let mut lines = BufReader::new(File::open(path)?).lines();

    let version_line = lines
        .next()
        .transpose()?
        .ok_or_else(|| StoreError::SchemaMismatch("empty header file".into()))?;
    let version: u32 = version_line.trim().parse().map_err(|_| {
        StoreError::SchemaMismatch(format!("invalid header version {version_line:?}"))
    })?;
    if version > REPO_VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }

    let names_line = lines
        .next()
        .transpose()?
        .ok_or_else(|| StoreError::SchemaMismatch("missing column declarations".into()))?;
    let declared: Vec<&str> = names_line.split('\t').collect();

    if declared.len() > schema.len() {
        return Err(StoreError::SchemaMismatch(format!(
            "header declares {} columns, schema supplies {}",
            declared.len(),
            schema.len()
        )));
    }
    for (on_disk, ours) in declared.iter().zip(schema.names()) {
        if *on_disk != ours.as_str() {
            return Err(StoreError::SchemaMismatch(format!(
                "header column {on_disk:?} does not match schema column {ours:?}"
            )));
        }
    }

    if schema.len() > declared.len() {
        info!(
            on_disk = declared.len(),
            extended_to = schema.len(),
            "extending header with new columns"
        );
        write_header(path, schema)?;
    }
    Ok(())
}

fn write_header(path: &Path, schema: &Schema) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{REPO_VERSION}")?;
    writeln!(writer, "{}", schema.names().join("\t"))?;
    writer.flush()?;
    Ok(())
}

fn create_data_file(path: &Path) -> Result<()> {
    let opened_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "# opened {opened_at}")?;
    writer.flush()?;
    Ok(())
}
