use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{MergeError, Result};
use crate::observability::metrics;
use crate::pipeline::ingestion::{SourceLoader, SourceReport};
use crate::pipeline::processing::conflation::{Conflator, MergeEngine, MergeStats};
use crate::pipeline::storage::{CsvSink, RecordSink};

/// Result of a complete merge run
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub stats: MergeStats,
    pub output: PathBuf,
    pub duration_secs: f64,
}

impl MergeReport {
    /// Sources that contributed no records
    pub fn skipped_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.skipped.is_some())
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Load, merge and write the merged table configured in `config`
    pub async fn run(config: Arc<Config>) -> Result<MergeReport> {
        let sink = CsvSink::new(config.output_path(), config.has_address_dimension());
        Self::run_with_sink(config, Arc::new(sink)).await
    }

    /// Same as [`Pipeline::run`] with the merged records going to `sink`
    #[instrument(skip_all)]
    pub async fn run_with_sink(config: Arc<Config>, sink: Arc<dyn RecordSink>) -> Result<MergeReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let t_run = Instant::now();
        info!(%run_id, "🚀 Starting merge run");

        let loader = SourceLoader::new(config.clone());
        let loaded = loader.load_all().await;
        info!("✅ Loaded {} records", loaded.records.len());

        let engine = MergeEngine::new(config.merge.clone());
        let outcome = engine.merge(loaded.records);

        let records = outcome.records;
        let write = tokio::task::spawn_blocking(move || sink.write(&records))
            .await
            .map_err(|e| MergeError::SinkWriteFailure {
                path: config.output_path(),
                reason: format!("sink task failed: {}", e),
            })
            .and_then(|result| result);

        let output = match write {
            Ok(path) => path,
            Err(e) => {
                error!(%run_id, "Merge run failed: {}", e);
                metrics::merge::sink_failed();
                return Err(e);
            }
        };

        let duration_secs = t_run.elapsed().as_secs_f64();
        metrics::merge::run_completed(&outcome.stats, duration_secs);

        let report = MergeReport {
            run_id,
            started_at,
            sources: loaded.reports,
            stats: outcome.stats,
            output,
            duration_secs,
        };
        for skipped in report.skipped_sources() {
            warn!(%run_id, source = %skipped.source, "Source contributed no records");
        }
        info!(
            %run_id,
            "🎉 Merge finished: {} records written to {} in {:.2}s",
            report.stats.output_records,
            report.output.display(),
            duration_secs
        );
        Ok(report)
    }
}
