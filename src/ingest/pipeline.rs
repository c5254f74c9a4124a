use std::fs::File;
use std::path::Path;

use tracing::{info, warn};

use super::indexer::{IndexReport, index_chunks};
use super::normalize::{TextNormalizer, is_substantive};
use super::outline::Outline;
use super::segment::TextSplitter;
use super::structure::{DocumentStructure, PopplerAnalyzer, StructuralAnalyzer};
use crate::backends::{embedder_from_config, ensure_embedder_ready};
use crate::config::AppConfig;
use crate::error::{RagError, Result};
use crate::model::{Chunk, IngestCounts, PageRecord};
use crate::semantic::Embedder;
use crate::store::VectorStore;
use crate::util::sha256_file;

/// Tagged, cleaned and segmented document, ready for indexing.
#[derive(Debug, Default)]
pub struct PreparedDocument {
    pub pages: Vec<PageRecord>,
    pub chunks: Vec<Chunk>,
    pub counts: IngestCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct IngestReport {
    pub embed_model: String,
    pub source_sha256: String,
    pub counts: IngestCounts,
    pub warnings: Vec<String>,
}

/// Runs the pure, order-dependent half of ingestion: exclusion, cleaning,
/// hierarchy tagging, segmentation and per-chunk refinement.
pub fn prepare_document(
    structure: DocumentStructure,
    normalizer: &TextNormalizer,
    splitter: &TextSplitter,
) -> Result<PreparedDocument> {
    let mut prepared = PreparedDocument::default();
    prepared.counts.pages_total = structure.page_count();
    prepared.counts.outline_entries = structure.outline.len();

    let outline = Outline::new(structure.outline)?;
    if outline.is_empty() {
        prepared
            .warnings
            .push("source has no outline; every page uses the default hierarchy".to_string());
    }
    let excluded = outline.excluded_pages();

    for (index, raw_text) in structure.pages.into_iter().enumerate() {
        let physical_page = (index + 1) as u32;
        if excluded.contains(&physical_page) {
            prepared.counts.pages_excluded += 1;
            continue;
        }

        let cleaned_text = normalizer.clean(&raw_text);
        if !is_substantive(&cleaned_text) {
            prepared.counts.pages_dropped_short += 1;
            continue;
        }

        prepared.pages.push(PageRecord {
            physical_page,
            raw_text,
            cleaned_text,
        });
    }
    prepared.counts.pages_kept = prepared.pages.len();

    for page in &prepared.pages {
        let hierarchy = outline.hierarchy_for(page.physical_page);
        for mut chunk in splitter.segment_page(page, &hierarchy) {
            if outline.refine_chunk(&mut chunk) {
                prepared.counts.chunks_refined += 1;
            }
            prepared.chunks.push(chunk);
        }
    }
    prepared.counts.chunks_total = prepared.chunks.len();

    info!(
        pages_total = prepared.counts.pages_total,
        pages_excluded = prepared.counts.pages_excluded,
        pages_dropped_short = prepared.counts.pages_dropped_short,
        pages_kept = prepared.counts.pages_kept,
        chunks = prepared.counts.chunks_total,
        chunks_refined = prepared.counts.chunks_refined,
        "document prepared"
    );
    Ok(prepared)
}

/// Full rebuild of the vector index from the configured source document.
pub struct IngestPipeline<'a> {
    config: &'a AppConfig,
    analyzer: &'a dyn StructuralAnalyzer,
    embedder: &'a dyn Embedder,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(
        config: &'a AppConfig,
        analyzer: &'a dyn StructuralAnalyzer,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self {
            config,
            analyzer,
            embedder,
        }
    }

    pub fn run(&self) -> Result<IngestReport> {
        let source = self.config.paths.source_path.as_path();
        let source_sha256 = check_source(source)?;
        ensure_embedder_ready(self.embedder)?;

        let structure = self.analyzer.analyze(source)?;
        let normalizer = TextNormalizer::new()?;
        let splitter = TextSplitter::new(
            self.config.ingest.chunk_size,
            self.config.ingest.chunk_overlap,
        )?;
        let prepared = prepare_document(structure, &normalizer, &splitter)?;
        for warning in &prepared.warnings {
            warn!(warning = %warning, "ingest warning");
        }

        let store = VectorStore::recreate(
            &self.config.paths.index_dir,
            self.embedder.model_id(),
            &source_sha256,
        )?;
        let report: IndexReport = index_chunks(
            &store,
            self.embedder,
            prepared.chunks,
            self.config.ingest.batch_size,
            self.config.ingest.workers,
        );

        let mut counts = prepared.counts;
        counts.batches_total = report.batches_total;
        counts.batches_failed = report.failures.len();
        let chunks_indexed = report.chunks_indexed;
        report.into_result()?;

        info!(
            index = %store.path().display(),
            chunks = chunks_indexed,
            batches = counts.batches_total,
            "vector index rebuilt"
        );
        Ok(IngestReport {
            embed_model: self.embedder.model_id().to_string(),
            source_sha256,
            counts,
            warnings: prepared.warnings,
        })
    }
}

/// Ingestion entrypoint: reads the configured source and rebuilds the
/// configured index with the configured embedding backend.
pub fn run_ingestion(config: &AppConfig) -> Result<IngestReport> {
    let analyzer = PopplerAnalyzer::new(config.ingest.max_pages);
    let embedder = embedder_from_config(&config.models)?;
    IngestPipeline::new(config, &analyzer, embedder.as_ref()).run()
}

fn check_source(source: &Path) -> Result<String> {
    let unavailable = |reason: String| RagError::SourceUnavailable {
        path: source.to_path_buf(),
        reason,
    };

    if !source.is_file() {
        return Err(unavailable("not a readable file".to_string()));
    }
    File::open(source).map_err(|err| unavailable(err.to_string()))?;
    sha256_file(source).map_err(|err| unavailable(err.to_string()))
}
