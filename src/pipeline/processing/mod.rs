// Record processing: normalization, address enrichment and conflation

pub mod conflation;
pub mod enrich;
pub mod normalize;
