//! Sink: persists the merged table.
//!
//! Writes go to a temporary file beside the destination and are renamed into
//! place, so a failed run never leaves a truncated table behind.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants;
use crate::error::{MergeError, Result};
use crate::types::MergedRecord;

/// Destination for a resolved record set
pub trait RecordSink: Send + Sync {
    /// Persist `records` and return where they went
    fn write(&self, records: &[MergedRecord]) -> Result<PathBuf>;
}

/// Column order of the merged table
pub fn merged_header(include_address: bool) -> Vec<&'static str> {
    let mut header = vec![
        constants::NAME_COLUMN,
        constants::PHONE_COLUMN,
        constants::CATEGORY_COLUMN,
        constants::SOURCE_COLUMN,
    ];
    if include_address {
        header.push(constants::ADDRESS_COLUMN);
    }
    header
}

/// Comma-delimited UTF-8 table sink
pub struct CsvSink {
    path: PathBuf,
    include_address: bool,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, include_address: bool) -> Self {
        Self {
            path: path.into(),
            include_address,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvSink {
    fn write(&self, records: &[MergedRecord]) -> Result<PathBuf> {
        let header = merged_header(self.include_address);
        let rows = records.iter().map(|r| {
            let mut row = vec![
                r.name.as_str(),
                r.phone.as_str(),
                r.category.as_str(),
                r.source.as_str(),
            ];
            if self.include_address {
                row.push(r.address.as_str());
            }
            row
        });

        write_table_atomically(&self.path, b',', &header, rows)?;
        info!("Merged dataset saved as: {}", self.path.display());
        Ok(self.path.clone())
    }
}

/// Sink that keeps the last written record set in memory, for tests and embedding
#[derive(Default, Clone)]
pub struct InMemorySink {
    written: Arc<Mutex<Vec<MergedRecord>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MergedRecord> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl RecordSink for InMemorySink {
    fn write(&self, records: &[MergedRecord]) -> Result<PathBuf> {
        let mut written = self.written.lock().map_err(|_| MergeError::SinkWriteFailure {
            path: PathBuf::from("memory"),
            reason: "sink lock poisoned".into(),
        })?;
        *written = records.to_vec();
        Ok(PathBuf::from("memory"))
    }
}

/// Write a header and rows to `path` through a sibling temp file and an atomic rename.
///
/// Any failure surfaces as [`MergeError::SinkWriteFailure`] and leaves `path` untouched.
pub fn write_table_atomically<H, R, I, F>(path: &Path, delimiter: u8, header: &[H], rows: R) -> Result<()>
where
    H: AsRef<[u8]>,
    R: IntoIterator<Item = I>,
    I: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
{
    let failure = |reason: String| MergeError::SinkWriteFailure {
        path: path.to_path_buf(),
        reason,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| failure(e.to_string()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| failure("destination has no file name".into()))?;
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
    debug!("Writing {} via {}", path.display(), tmp_path.display());

    let result = write_rows(&tmp_path, delimiter, header, rows)
        .and_then(|()| fs::rename(&tmp_path, path).map_err(MergeError::from));

    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            warn!("Could not remove temp file {}: {}", tmp_path.display(), cleanup);
        }
        return Err(match e {
            MergeError::SinkWriteFailure { .. } => e,
            other => failure(other.to_string()),
        });
    }
    Ok(())
}

fn write_rows<H, R, I, F>(tmp_path: &Path, delimiter: u8, header: &[H], rows: R) -> Result<()>
where
    H: AsRef<[u8]>,
    R: IntoIterator<Item = I>,
    I: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
{
    let file = File::create(tmp_path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(file);

    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| MergeError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}
