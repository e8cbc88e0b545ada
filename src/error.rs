use std::path::PathBuf;
use thiserror::Error;

use crate::types::Source;

#[derive(Error, Debug)]
pub enum MergeError {
    /// File missing, unreadable, or its read timed out. The source is skipped.
    #[error("source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: Source, reason: String },

    /// No name-like column in the table header. Every row of the source is rejected.
    #[error("source '{source_name}' has none of the columns {expected:?}")]
    SourceSchemaMismatch {
        source_name: Source,
        expected: Vec<String>,
    },

    /// The merged table could not be committed. Fatal for the run.
    #[error("failed to write '{}': {reason}", path.display())]
    SinkWriteFailure { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    /// Per-source failures are reported and skipped; everything else aborts the run.
    pub fn is_source_local(&self) -> bool {
        matches!(
            self,
            MergeError::SourceUnavailable { .. } | MergeError::SourceSchemaMismatch { .. }
        )
    }

    /// Short fixed label for metrics and reports
    pub fn kind_label(&self) -> &'static str {
        match self {
            MergeError::SourceUnavailable { .. } => "unavailable",
            MergeError::SourceSchemaMismatch { .. } => "schema",
            MergeError::SinkWriteFailure { .. } => "sink",
            MergeError::Config(_) => "config",
            MergeError::Toml(_) => "toml",
            MergeError::Csv(_) => "csv",
            MergeError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
