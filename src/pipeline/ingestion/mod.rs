//! Source loading: reads each source table with its own delimiter, drops
//! malformed rows, normalizes and tags the rest.

use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::error::{MergeError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::normalize::NormalizationRegistry;
use crate::types::{NormalizedRecord, RawRecord, Source};

/// A delimited table read into memory. Header names are trimmed.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    /// Every row has exactly `headers.len()` fields
    pub rows: Vec<Vec<String>>,
    /// Rows dropped for extra fields or invalid UTF-8
    pub malformed_rows: usize,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Read a delimited file with a header row.
///
/// Rows with more fields than the header are skipped. Short rows are padded
/// with empty cells.
pub fn read_table(path: &Path, delimiter: u8, escape: Option<u8>) -> Result<Table> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .escape(escape)
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let width = headers.len();

    let mut table = Table {
        headers,
        ..Default::default()
    };
    for (index, result) in reader.records().enumerate() {
        match result {
            Ok(record) if record.len() > width => {
                debug!(
                    "Skipping row {} in {}: {} fields, expected {}",
                    index + 1,
                    path.display(),
                    record.len(),
                    width
                );
                table.malformed_rows += 1;
            }
            Ok(record) => {
                let mut row: Vec<String> = record.iter().map(|f| f.to_string()).collect();
                row.resize(width, String::new());
                table.rows.push(row);
            }
            Err(e) if is_row_error(&e) => {
                debug!("Skipping malformed row {} in {}: {}", index + 1, path.display(), e);
                table.malformed_rows += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(table)
}

/// Errors confined to one row; anything else means the file itself is unreadable
fn is_row_error(error: &csv::Error) -> bool {
    matches!(error.kind(), csv::ErrorKind::Utf8 { .. })
}

/// Outcome of loading one source, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: Source,
    pub path: PathBuf,
    pub rows_loaded: usize,
    pub malformed_rows: usize,
    pub rejected_rows: usize,
    /// Why the source contributed nothing, when it was skipped
    pub skipped: Option<String>,
}

/// Normalized records of one source
#[derive(Debug, Clone)]
pub struct SourceLoad {
    pub source: Source,
    pub path: PathBuf,
    pub records: Vec<NormalizedRecord>,
    pub malformed_rows: usize,
    pub rejected_rows: usize,
}

/// Every source's records concatenated in load order, plus per-source reports
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub records: Vec<NormalizedRecord>,
    pub reports: Vec<SourceReport>,
}

#[derive(Clone)]
pub struct SourceLoader {
    config: Arc<Config>,
    registry: Arc<NormalizationRegistry>,
}

impl SourceLoader {
    pub fn new(config: Arc<Config>) -> Self {
        let registry = Arc::new(NormalizationRegistry::from_schemas(config.schemas()));
        Self { config, registry }
    }

    /// Loader using a caller-built registry; only sources registered there are loaded
    pub fn with_registry(config: Arc<Config>, registry: Arc<NormalizationRegistry>) -> Self {
        Self { config, registry }
    }

    /// The address-enriched variant wins when it is configured and present
    pub fn resolve_path(&self, source: Source) -> PathBuf {
        match self.config.enriched_source_path(source) {
            Some(enriched) if enriched.is_file() => enriched,
            _ => self.config.source_path(source),
        }
    }

    /// Path to read plus the escape byte its dialect needs.
    ///
    /// The enriched file is written by this crate with plain RFC 4180 quoting,
    /// so only the raw table is read with the source's escape character.
    fn resolve_input(&self, source: Source) -> Result<(PathBuf, Option<u8>)> {
        match self.config.enriched_source_path(source) {
            Some(enriched) if enriched.is_file() => Ok((enriched, None)),
            _ => Ok((
                self.config.source_path(source),
                self.config.schema(source).escape_byte()?,
            )),
        }
    }

    /// Read and normalize one source. Blocking.
    #[instrument(skip(self))]
    pub fn load_source(&self, source: Source) -> Result<SourceLoad> {
        let started = Instant::now();
        let (path, escape) = self.resolve_input(source)?;
        let schema = self.config.schema(source);
        let unavailable = |reason: String| MergeError::SourceUnavailable {
            source_name: source,
            reason,
        };

        let delimiter = schema.delimiter_byte()?;
        let table = read_table(&path, delimiter, escape)
            .map_err(|e| unavailable(format!("{}: {}", path.display(), e)))?;
        metrics::loader::read_duration(source, started.elapsed().as_secs_f64());

        if schema
            .resolve_name_column(table.headers.iter().map(|h| h.as_str()))
            .is_none()
        {
            metrics::loader::rows_rejected(source, table.rows.len());
            return Err(MergeError::SourceSchemaMismatch {
                source_name: source,
                expected: schema.name_columns.clone(),
            });
        }

        let mut records = Vec::with_capacity(table.rows.len());
        let mut rejected_rows = 0;
        for row in table.rows {
            let raw = RawRecord::from_pairs(table.headers.iter().cloned().zip(row));
            match self.registry.normalize(source, &raw) {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!("Rejected row: {}", e);
                    rejected_rows += 1;
                }
            }
        }

        if table.malformed_rows > 0 {
            warn!("Skipped {} malformed rows in {}", table.malformed_rows, path.display());
            metrics::loader::malformed_rows(source, table.malformed_rows);
        }
        if rejected_rows > 0 {
            metrics::loader::rows_rejected(source, rejected_rows);
        }
        metrics::loader::rows_loaded(source, records.len());
        info!("Loaded {} records from {}", records.len(), path.display());

        Ok(SourceLoad {
            source,
            path,
            records,
            malformed_rows: table.malformed_rows,
            rejected_rows,
        })
    }

    /// Load every source concurrently, each under the configured read timeout,
    /// and concatenate the results in load order.
    ///
    /// A source that fails, times out, or has no name column is reported and skipped.
    pub async fn load_all(&self) -> LoadSummary {
        let timeout = self.config.source_read_timeout();

        let pending: Vec<_> = self
            .registry
            .list_sources()
            .into_iter()
            .map(|source| {
                let loader = self.clone();
                let task = tokio::task::spawn_blocking(move || loader.load_source(source));
                (source, tokio::time::timeout(timeout, task))
            })
            .collect();

        let mut summary = LoadSummary::default();
        for (source, load) in pending {
            let outcome = match load.await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(MergeError::SourceUnavailable {
                    source_name: source,
                    reason: format!("load task failed: {}", join_error),
                }),
                Err(_) => Err(MergeError::SourceUnavailable {
                    source_name: source,
                    reason: format!("read timed out after {:?}", timeout),
                }),
            };
            self.fold_outcome(source, outcome, &mut summary);
        }
        summary
    }

    fn fold_outcome(&self, source: Source, outcome: Result<SourceLoad>, summary: &mut LoadSummary) {
        match outcome {
            Ok(load) => {
                summary.reports.push(SourceReport {
                    source,
                    path: load.path,
                    rows_loaded: load.records.len(),
                    malformed_rows: load.malformed_rows,
                    rejected_rows: load.rejected_rows,
                    skipped: None,
                });
                summary.records.extend(load.records);
            }
            Err(e) => {
                if e.is_source_local() {
                    warn!("Skipping {} dataset: {}", source, e);
                } else {
                    error!("Skipping {} dataset after unexpected failure: {}", source, e);
                }
                metrics::loader::source_skipped(source, e.kind_label());
                summary.reports.push(SourceReport {
                    source,
                    path: self.resolve_path(source),
                    rows_loaded: 0,
                    malformed_rows: 0,
                    rejected_rows: 0,
                    skipped: Some(e.to_string()),
                });
            }
        }
    }
}
