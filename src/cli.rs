use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_BOOK_TITLE, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
    DEFAULT_EMBED_MODEL, DEFAULT_GENERATION_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_RERANK_MODEL, DEFAULT_RERANK_THRESHOLD, DEFAULT_RERANK_TOP_K, DEFAULT_RERANK_URL,
    DEFAULT_RETRIEVAL_K, DEFAULT_WORKERS, DEFAULT_WORKSPACE,
};
use crate::semantic::DEFAULT_EMBEDDING_DIM;

#[derive(Parser, Debug)]
#[command(
    name = "textbook-rag",
    version,
    about = "Hierarchy-aware retrieval-augmented question answering over a single textbook"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the vector index from the source document.
    Ingest(IngestArgs),
    /// Answer one question from the indexed textbook.
    Query(QueryArgs),
    /// Report index metadata and audit-log size.
    Status(StatusArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmbedBackend {
    LocalHash,
    Ollama,
}

impl EmbedBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalHash => "local-hash",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AnswerFormat {
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, default_value = DEFAULT_WORKSPACE)]
    pub workspace: PathBuf,

    #[arg(long)]
    pub source_path: Option<PathBuf>,

    #[arg(long)]
    pub index_dir: Option<PathBuf>,

    #[arg(long)]
    pub audit_log_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = EmbedBackend::Ollama)]
    pub embed_backend: EmbedBackend,

    #[arg(long, default_value = DEFAULT_EMBED_MODEL)]
    pub embed_model: String,

    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIM)]
    pub embed_dimensions: usize,

    #[arg(long, default_value = DEFAULT_OLLAMA_URL)]
    pub ollama_url: String,

    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    #[arg(long)]
    pub max_pages: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    pub question: String,

    #[arg(long, default_value = DEFAULT_GENERATION_MODEL)]
    pub generation_model: String,

    #[arg(long, default_value = DEFAULT_RERANK_URL)]
    pub rerank_url: String,

    #[arg(long, default_value = DEFAULT_RERANK_MODEL)]
    pub rerank_model: String,

    #[arg(long, default_value_t = DEFAULT_RETRIEVAL_K)]
    pub retrieval_k: usize,

    #[arg(long, default_value_t = DEFAULT_RERANK_THRESHOLD, allow_hyphen_values = true)]
    pub rerank_threshold: f32,

    #[arg(long, default_value_t = DEFAULT_RERANK_TOP_K)]
    pub rerank_top_k: usize,

    #[arg(long, default_value = DEFAULT_BOOK_TITLE)]
    pub book_title: String,

    #[arg(long, value_enum, default_value_t = AnswerFormat::Text)]
    pub answer_format: AnswerFormat,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
