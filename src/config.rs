//! Immutable runtime configuration, built once from CLI flags and threaded
//! through every constructor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::cli::{AnswerFormat, CommonArgs, EmbedBackend, IngestArgs, QueryArgs};
use crate::error::{RagError, Result};
use crate::semantic::{Embedder, LocalHashEmbedder};

pub const DEFAULT_WORKSPACE: &str = ".cache/textbook-rag";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_RERANK_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_RERANK_URL: &str = "http://localhost:8080";
pub const DEFAULT_BOOK_TITLE: &str = "An Introduction to Statistical Learning";

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_RETRIEVAL_K: usize = 15;
pub const DEFAULT_RERANK_THRESHOLD: f32 = -3.5;
pub const DEFAULT_RERANK_TOP_K: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub models: ModelConfig,
    pub ingest: IngestSettings,
    pub query: QuerySettings,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub workspace: PathBuf,
    pub source_path: PathBuf,
    pub index_dir: PathBuf,
    pub audit_log_path: PathBuf,
    pub manifest_dir: PathBuf,
}

impl PathsConfig {
    /// Default layout under `workspace`.
    pub fn under(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            source_path: workspace.join("data").join("source.pdf"),
            index_dir: workspace.join("index"),
            audit_log_path: workspace.join("logs").join("interactions.jsonl"),
            manifest_dir: workspace.join("manifests"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub embed_backend: EmbedBackend,
    pub embed_model: String,
    pub embed_dimensions: usize,
    pub ollama_url: String,
    pub generation_model: String,
    pub rerank_url: String,
    pub rerank_model: String,
    pub request_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embed_backend: EmbedBackend::Ollama,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            embed_dimensions: crate::semantic::DEFAULT_EMBEDDING_DIM,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            rerank_url: DEFAULT_RERANK_URL.to_string(),
            rerank_model: DEFAULT_RERANK_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ModelConfig {
    /// Identifier the configured embedder records in the index.
    pub fn embed_model_id(&self) -> String {
        match self.embed_backend {
            EmbedBackend::LocalHash => LocalHashEmbedder::new(self.embed_dimensions)
                .model_id()
                .to_string(),
            EmbedBackend::Ollama => self.embed_model.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub workers: usize,
    pub max_pages: Option<usize>,
    pub manifest_path: Option<PathBuf>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            max_pages: None,
            manifest_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub retrieval_k: usize,
    pub rerank_threshold: f32,
    pub rerank_top_k: usize,
    pub book_title: String,
    pub answer_format: AnswerFormat,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            retrieval_k: DEFAULT_RETRIEVAL_K,
            rerank_threshold: DEFAULT_RERANK_THRESHOLD,
            rerank_top_k: DEFAULT_RERANK_TOP_K,
            book_title: DEFAULT_BOOK_TITLE.to_string(),
            answer_format: AnswerFormat::Text,
        }
    }
}

impl AppConfig {
    /// Defaults for every setting, rooted at `workspace`.
    pub fn with_workspace(workspace: &Path) -> Self {
        Self {
            paths: PathsConfig::under(workspace),
            models: ModelConfig::default(),
            ingest: IngestSettings::default(),
            query: QuerySettings::default(),
        }
    }

    pub fn from_common(args: &CommonArgs) -> Result<Self> {
        let mut config = Self::with_workspace(&args.workspace);
        if let Some(path) = &args.source_path {
            config.paths.source_path.clone_from(path);
        }
        if let Some(path) = &args.index_dir {
            config.paths.index_dir.clone_from(path);
        }
        if let Some(path) = &args.audit_log_path {
            config.paths.audit_log_path.clone_from(path);
        }

        config.models.embed_backend = args.embed_backend;
        config.models.embed_model = args.embed_model.trim().to_string();
        config.models.embed_dimensions = args.embed_dimensions;
        config.models.ollama_url = args.ollama_url.trim().to_string();
        config.models.request_timeout = Duration::from_secs(args.request_timeout_secs);
        if config.models.embed_backend == EmbedBackend::LocalHash
            && config.models.embed_model != DEFAULT_EMBED_MODEL
        {
            warn!(
                embed_model = %config.models.embed_model,
                "local-hash backend ignores --embed-model"
            );
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_ingest(args: &IngestArgs) -> Result<Self> {
        let mut config = Self::from_common(&args.common)?;
        config.ingest = IngestSettings {
            chunk_size: args.chunk_size,
            chunk_overlap: args.chunk_overlap,
            batch_size: args.batch_size,
            workers: args.workers,
            max_pages: args.max_pages,
            manifest_path: args.manifest_path.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_query(args: &QueryArgs) -> Result<Self> {
        let mut config = Self::from_common(&args.common)?;
        config.models.generation_model = args.generation_model.trim().to_string();
        config.models.rerank_url = args.rerank_url.trim().to_string();
        config.models.rerank_model = args.rerank_model.trim().to_string();
        config.query = QuerySettings {
            retrieval_k: args.retrieval_k,
            rerank_threshold: args.rerank_threshold,
            rerank_top_k: args.rerank_top_k,
            book_title: args.book_title.trim().to_string(),
            answer_format: args.answer_format,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ingest = &self.ingest;
        if ingest.chunk_size == 0 {
            return invalid("chunk size must be positive");
        }
        if ingest.chunk_overlap >= ingest.chunk_size {
            return invalid(&format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                ingest.chunk_overlap, ingest.chunk_size
            ));
        }
        if ingest.batch_size == 0 {
            return invalid("batch size must be positive");
        }
        if ingest.workers == 0 {
            return invalid("worker count must be positive");
        }
        if ingest.max_pages == Some(0) {
            return invalid("max pages must be positive when set");
        }

        let models = &self.models;
        if models.embed_backend == EmbedBackend::Ollama && models.embed_model.is_empty() {
            return invalid("embedding model must not be empty");
        }
        if models.embed_dimensions == 0 {
            return invalid("embedding dimensions must be positive");
        }
        if models.generation_model.is_empty() {
            return invalid("generation model must not be empty");
        }
        if models.rerank_model.is_empty() {
            return invalid("rerank model must not be empty");
        }
        if models.request_timeout.is_zero() {
            return invalid("request timeout must be positive");
        }

        let query = &self.query;
        if query.retrieval_k == 0 {
            return invalid("retrieval k must be positive");
        }
        if query.rerank_top_k == 0 {
            return invalid("rerank top-k must be positive");
        }
        if !query.rerank_threshold.is_finite() {
            return invalid("rerank threshold must be a finite number");
        }
        if query.book_title.is_empty() {
            return invalid("book title must not be empty");
        }

        Ok(())
    }

    /// Manifest location for an ingest run started at `compact_timestamp`.
    pub fn ingest_manifest_path(&self, compact_timestamp: &str) -> PathBuf {
        self.ingest.manifest_path.clone().unwrap_or_else(|| {
            self.paths
                .manifest_dir
                .join(format!("ingest_run_{compact_timestamp}.json"))
        })
    }
}

fn invalid(message: &str) -> Result<()> {
    Err(RagError::Configuration(message.to_string()))
}
