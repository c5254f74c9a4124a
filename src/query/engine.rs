use tracing::{info, warn};

use super::context::{assemble_context, context_previews};
use super::generation::{JsonOnlyGenerator, NOT_FOUND_ANSWER, PromptTemplate};
use super::rerank::Reranker;
use super::Generator;
use crate::audit::AuditLog;
use crate::backends::{OllamaGenerator, TeiCrossEncoder, embedder_from_config, ensure_embedder_ready};
use crate::cli::AnswerFormat;
use crate::config::{AppConfig, QuerySettings};
use crate::error::{RagError, Result};
use crate::model::{Chunk, QueryResult};
use crate::semantic::Embedder;
use crate::store::VectorStore;

/// Long-lived query pipeline. Built once; every dependency is resolved at
/// construction so a bad configuration fails before the first question.
pub struct RagEngine {
    store: VectorStore,
    embedder: Box<dyn Embedder>,
    reranker: Reranker,
    generator: Box<dyn Generator>,
    prompt: PromptTemplate,
    audit: AuditLog,
    retrieval_k: usize,
}

impl RagEngine {
    pub fn new(
        store: VectorStore,
        embedder: Box<dyn Embedder>,
        reranker: Reranker,
        generator: Box<dyn Generator>,
        audit: AuditLog,
        settings: &QuerySettings,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            generator,
            prompt: PromptTemplate::new(settings.book_title.clone()),
            audit,
            retrieval_k: settings.retrieval_k,
        }
    }

    /// Wires the configured index and model services. Each service must
    /// answer before the engine is returned.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let models = &config.models;
        let embedder = embedder_from_config(models)?;
        let store = VectorStore::open_existing(&config.paths.index_dir, Some(embedder.model_id()))?;
        ensure_embedder_ready(embedder.as_ref())?;

        let encoder = TeiCrossEncoder::new(&models.rerank_url, &models.rerank_model, models.request_timeout)?;
        encoder.ensure_ready()?;
        let reranker = Reranker::new(
            Box::new(encoder),
            config.query.rerank_threshold,
            config.query.rerank_top_k,
        );

        let generator = OllamaGenerator::new(
            &models.ollama_url,
            &models.generation_model,
            models.request_timeout,
        )?;
        generator.ensure_ready()?;
        let generator: Box<dyn Generator> = match config.query.answer_format {
            AnswerFormat::Text => Box::new(generator),
            AnswerFormat::Json => Box::new(JsonOnlyGenerator::new(generator)),
        };

        info!(
            index = %store.path().display(),
            embed_model = %embedder.model_id(),
            rerank_model = %models.rerank_model,
            generation_model = %models.generation_model,
            "query engine ready"
        );
        Ok(Self::new(
            store,
            embedder,
            reranker,
            generator,
            AuditLog::new(config.paths.audit_log_path.clone()),
            &config.query,
        ))
    }

    /// The `k` chunks closest to `question` in embedding space, best first.
    pub fn retrieve(&self, question: &str, k: usize) -> Result<Vec<Chunk>> {
        let query_vector = self
            .embedder
            .embed(&[question])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("no vector returned for the question".to_string()))?;

        Ok(self
            .store
            .search(&query_vector, k)?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    pub fn query(&self, question: &str) -> Result<QueryResult> {
        let candidates = self.retrieve(question, self.retrieval_k)?;
        let candidate_count = candidates.len();
        let selected = self.reranker.rerank(question, candidates)?;

        let answer = if selected.is_empty() {
            info!(candidates = candidate_count, "no relevant context; returning fallback answer");
            NOT_FOUND_ANSWER.to_string()
        } else {
            let context = assemble_context(&selected);
            let prompt = self.prompt.render(&context, question);
            self.generator.generate(&prompt)?
        };

        let audit_error = match self.audit.append(question, &answer, &selected) {
            Ok(()) => None,
            Err(err) => {
                warn!(path = %self.audit.path().display(), error = %err, "audit log append failed");
                Some(err.to_string())
            }
        };

        info!(
            candidates = candidate_count,
            selected = selected.len(),
            "question answered"
        );
        Ok(QueryResult {
            answer,
            contexts: context_previews(&selected),
            audit_error,
        })
    }
}
