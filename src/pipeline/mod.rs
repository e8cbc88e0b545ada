// Merge pipeline: ingestion, processing, and storage

pub mod ingestion;
#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod processing;
pub mod storage;

pub use pipeline::{MergeReport, Pipeline};
