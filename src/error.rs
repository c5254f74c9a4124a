use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("source document unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("outline is not sorted by start page: entry {index} starts at page {page} after page {previous}")]
    UnsortedOutline {
        index: usize,
        page: u32,
        previous: u32,
    },

    #[error("document extraction failed: {0}")]
    Extraction(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("reranking failed: {0}")]
    Rerank(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error(
        "{failed} of {total} indexing batches failed; first failure (batch {first_batch}, {first_batch_chunks} chunks): {first}"
    )]
    IndexingBatchFailure {
        failed: usize,
        total: usize,
        first_batch: usize,
        first_batch_chunks: usize,
        first: Box<RagError>,
    },

    #[error("audit log write failed: {0}")]
    LogWrite(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;
