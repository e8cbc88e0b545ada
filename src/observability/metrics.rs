//! Metrics for the merge pipeline
//!
//! Names follow Prometheus conventions. Without an installed recorder every
//! call below is a no-op, so library users and tests need no setup.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Loader metrics
    LoaderRowsLoaded,
    LoaderMalformedRows,
    LoaderRowsRejected,
    LoaderSourcesSkipped,
    LoaderReadDuration,

    // Merge metrics
    MergeRuns,
    MergeGroups,
    MergeDuplicatesCollapsed,
    MergeRecordsWritten,
    MergeBlankRecordsDropped,
    MergeDuration,
    MergeSinkFailures,

    // Enricher metrics
    EnrichRowsWritten,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::LoaderRowsLoaded => "listing_merge_loader_rows_loaded_total",
            MetricName::LoaderMalformedRows => "listing_merge_loader_malformed_rows_total",
            MetricName::LoaderRowsRejected => "listing_merge_loader_rows_rejected_total",
            MetricName::LoaderSourcesSkipped => "listing_merge_loader_sources_skipped_total",
            MetricName::LoaderReadDuration => "listing_merge_loader_read_duration_seconds",

            MetricName::MergeRuns => "listing_merge_runs_total",
            MetricName::MergeGroups => "listing_merge_groups_total",
            MetricName::MergeDuplicatesCollapsed => "listing_merge_duplicates_collapsed_total",
            MetricName::MergeRecordsWritten => "listing_merge_records_written_total",
            MetricName::MergeBlankRecordsDropped => "listing_merge_blank_records_dropped_total",
            MetricName::MergeDuration => "listing_merge_duration_seconds",
            MetricName::MergeSinkFailures => "listing_merge_sink_failures_total",

            MetricName::EnrichRowsWritten => "listing_merge_enrich_rows_written_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Idempotent; a second call is ignored.
pub fn init() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
            info!("Metrics recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Current metrics in Prometheus text format, if the recorder is installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|h| h.render())
}

// ============================================================================
// Loader Metrics
// ============================================================================

pub mod loader {
    use super::MetricName;
    use crate::types::Source;

    pub fn rows_loaded(source: Source, count: usize) {
        ::metrics::counter!(MetricName::LoaderRowsLoaded.as_str(), "source" => source.as_str())
            .increment(count as u64);
    }

    pub fn malformed_rows(source: Source, count: usize) {
        ::metrics::counter!(MetricName::LoaderMalformedRows.as_str(), "source" => source.as_str())
            .increment(count as u64);
    }

    pub fn rows_rejected(source: Source, count: usize) {
        ::metrics::counter!(MetricName::LoaderRowsRejected.as_str(), "source" => source.as_str())
            .increment(count as u64);
    }

    /// `reason` is a short fixed label such as `unavailable` or `schema`
    pub fn source_skipped(source: Source, reason: &'static str) {
        ::metrics::counter!(
            MetricName::LoaderSourcesSkipped.as_str(),
            "source" => source.as_str(),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn read_duration(source: Source, secs: f64) {
        ::metrics::histogram!(MetricName::LoaderReadDuration.as_str(), "source" => source.as_str())
            .record(secs);
    }
}

// ============================================================================
// Merge Metrics
// ============================================================================

pub mod merge {
    use super::MetricName;
    use crate::pipeline::processing::conflation::MergeStats;

    pub fn run_completed(stats: &MergeStats, secs: f64) {
        ::metrics::counter!(MetricName::MergeRuns.as_str()).increment(1);
        ::metrics::counter!(MetricName::MergeGroups.as_str()).increment(stats.groups as u64);
        ::metrics::counter!(MetricName::MergeDuplicatesCollapsed.as_str())
            .increment(stats.duplicates_collapsed as u64);
        ::metrics::counter!(MetricName::MergeRecordsWritten.as_str())
            .increment(stats.output_records as u64);
        ::metrics::counter!(MetricName::MergeBlankRecordsDropped.as_str())
            .increment(stats.blank_records_dropped as u64);
        ::metrics::histogram!(MetricName::MergeDuration.as_str()).record(secs);
    }

    pub fn sink_failed() {
        ::metrics::counter!(MetricName::MergeSinkFailures.as_str()).increment(1);
    }
}

// ============================================================================
// Enricher Metrics
// ============================================================================

pub mod enrich {
    use super::MetricName;

    pub fn rows_written(count: usize) {
        ::metrics::counter!(MetricName::EnrichRowsWritten.as_str()).increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        let names = [
            MetricName::LoaderRowsLoaded,
            MetricName::MergeDuration,
            MetricName::EnrichRowsWritten,
        ];
        for name in names {
            assert!(name.as_str().starts_with("listing_merge_"));
            assert_eq!(name.to_string(), name.as_str());
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        loader::rows_loaded(crate::types::Source::Google, 3);
        merge::sink_failed();
    }
}
