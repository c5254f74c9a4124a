//! Offline ingestion: source document to hierarchy-tagged chunks in the
//! vector index.

mod indexer;
mod normalize;
mod outline;
mod pipeline;
mod segment;
mod structure;

pub use pipeline::{IngestReport, run_ingestion};

#[cfg(test)]
pub use pipeline::IngestPipeline;
#[cfg(test)]
pub use structure::{DocumentStructure, StructuralAnalyzer};
