use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::context::{assemble_context, context_previews};
use super::generation::{JsonOnlyGenerator, NOT_FOUND_ANSWER, PromptTemplate, sanitize_json_output};
use super::rerank::{Reranker, select_relevant};
use super::{CrossEncoder, Generator, RagEngine};
use crate::audit::AuditLog;
use crate::backends::embedder_from_config;
use crate::cli::EmbedBackend;
use crate::config::{AppConfig, QuerySettings};
use crate::error::{RagError, Result};
use crate::ingest::{DocumentStructure, IngestPipeline, StructuralAnalyzer};
use crate::model::{AuditLogEntry, Chunk, ChunkMetadata, OutlineEntry, ScoredChunk};
use crate::semantic::{Embedder, LocalHashEmbedder};
use crate::store::VectorStore;

fn chunk(page: u32, text: &str) -> Chunk {
    Chunk {
        text: text.to_string(),
        metadata: ChunkMetadata {
            physical_page: page,
            chapter: "Linear Regression".to_string(),
            subchapter: "3.1 Simple Linear Regression".to_string(),
            section: "3.1.1 Estimating the Coefficients".to_string(),
            original_page: page - 1,
        },
    }
}

struct FixedScores(Vec<f32>);

impl CrossEncoder for FixedScores {
    fn model_id(&self) -> &str {
        "fixed-scores"
    }

    fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// Scores a passage by whether it mentions any word of the query.
struct KeywordEncoder;

impl CrossEncoder for KeywordEncoder {
    fn model_id(&self) -> &str {
        "keyword"
    }

    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let words = query
            .split_whitespace()
            .map(|word| {
                word.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|word| word.len() > 4)
            .collect::<Vec<String>>();
        Ok(passages
            .iter()
            .map(|passage| {
                let passage = passage.to_lowercase();
                if words.iter().any(|word| passage.contains(word.as_str())) {
                    6.0
                } else {
                    -9.0
                }
            })
            .collect())
    }
}

struct RecordingGenerator {
    calls: Arc<AtomicUsize>,
    json_requested: Arc<AtomicBool>,
    reply: String,
}

impl RecordingGenerator {
    fn new(reply: &str) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            json_requested: Arc::new(AtomicBool::new(false)),
            reply: reply.to_string(),
        }
    }
}

impl Generator for RecordingGenerator {
    fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    fn request_json_output(&mut self) {
        self.json_requested.store(true, Ordering::SeqCst);
    }
}

/// Answers by citing the first document page it finds in the prompt.
struct CitingGenerator;

impl Generator for CitingGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let page = prompt
            .split("page='")
            .nth(1)
            .and_then(|rest| rest.split('\'').next())
            .ok_or_else(|| RagError::Generation("prompt carried no documents".to_string()))?;
        Ok(format!(
            "Linear regression predicts a quantitative response from a predictor. [Page {page}]"
        ))
    }
}

struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Generation("connection refused".to_string()))
    }
}

#[test]
fn threshold_is_strict() {
    let chunks = vec![chunk(1, "A"), chunk(2, "B"), chunk(3, "C")];

    let selected = select_relevant(chunks, vec![-4.0, -1.0, -3.5], -3.5, 5);

    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].chunk.text, "B");
    assert_eq!(selected[0].score, -1.0);
}

#[test]
fn top_k_keeps_best_scores_in_descending_order() {
    let chunks = (0..8)
        .map(|index| chunk(index + 1, &format!("chunk {index}")))
        .collect::<Vec<Chunk>>();
    let scores = vec![0.5, 3.0, -1.0, 2.0, 7.0, -2.0, 1.0, 4.0];

    let selected = select_relevant(chunks, scores, -3.5, 5);

    let kept = selected
        .iter()
        .map(|scored| scored.score)
        .collect::<Vec<f32>>();
    assert_eq!(kept, vec![7.0, 4.0, 3.0, 2.0, 1.0]);
    assert_eq!(selected[0].chunk.text, "chunk 4");
}

#[test]
fn reranker_rejects_score_count_mismatch() {
    let reranker = Reranker::new(Box::new(FixedScores(vec![1.0])), -3.5, 5);

    let result = reranker.rerank("q", vec![chunk(1, "a"), chunk(2, "b")]);
    assert!(matches!(result, Err(RagError::Rerank(_))));
}

#[test]
fn reranker_skips_scoring_without_candidates() {
    let reranker = Reranker::new(Box::new(FixedScores(vec![1.0])), -3.5, 5);
    assert!(reranker.rerank("q", Vec::new()).unwrap().is_empty());
}

#[test]
fn context_records_carry_full_hierarchy() {
    let mut first = chunk(57, "First body.");
    first.metadata.section = "Bob's Section".to_string();
    let selected = vec![
        ScoredChunk {
            chunk: first,
            score: 2.0,
        },
        ScoredChunk {
            chunk: chunk(58, "Second body."),
            score: 1.0,
        },
    ];

    let context = assemble_context(&selected);

    assert_eq!(
        context,
        "<DOCUMENT page='57' chapter='Linear Regression' subchapter='3.1 Simple Linear Regression' section='Bob&apos;s Section'>\n\
         First body.\n\
         </DOCUMENT>\n\
         <DOCUMENT page='58' chapter='Linear Regression' subchapter='3.1 Simple Linear Regression' section='3.1.1 Estimating the Coefficients'>\n\
         Second body.\n\
         </DOCUMENT>"
    );
}

#[test]
fn previews_cut_at_two_hundred_characters() {
    let selected = vec![ScoredChunk {
        chunk: chunk(12, &"é".repeat(250)),
        score: 0.0,
    }];

    let previews = context_previews(&selected);

    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0], format!("Page 12: {}...", "é".repeat(200)));
}

#[test]
fn prompt_enforces_grounding_rules() {
    let prompt = PromptTemplate::new("An Introduction to Statistical Learning")
        .render("<DOCUMENT page='2'>body</DOCUMENT>", "¿Qué es la regresión lineal?");

    assert!(prompt.contains("\"An Introduction to Statistical Learning\""));
    assert!(prompt.contains("<DOCUMENT page='2'>body</DOCUMENT>"));
    assert!(prompt.contains("USER QUESTION: ¿Qué es la regresión lineal?"));
    assert!(prompt.contains(NOT_FOUND_ANSWER));
    assert!(prompt.contains("[Page X]"));
    assert!(prompt.contains("\\text{}"));
    assert!(prompt.ends_with("Technical Response:"));
}

#[test]
fn json_output_is_extracted_and_flattened() {
    let raw = r#"Here you go: {"score": 1,\n "reason": "ok ✓✓ fine"} thanks"#;
    assert_eq!(
        sanitize_json_output(raw),
        r#"{"score": 1,  "reason": "ok   fine"}"#
    );
    assert_eq!(sanitize_json_output("  no json  "), "no json");
}

#[test]
fn json_only_generator_requests_json_mode_and_cleans_output() {
    let inner = RecordingGenerator::new("noise {\"verdict\": \"yes\"} noise");
    let requested = Arc::clone(&inner.json_requested);

    let generator = JsonOnlyGenerator::new(inner);

    assert!(requested.load(Ordering::SeqCst));
    assert_eq!(generator.generate("p").unwrap(), "{\"verdict\": \"yes\"}");
}

fn engine_with(
    index_dir: &Path,
    audit_path: &Path,
    scores: Box<dyn CrossEncoder>,
    generator: Box<dyn Generator>,
) -> RagEngine {
    let embedder = LocalHashEmbedder::new(32);
    let store = VectorStore::recreate(index_dir, embedder.model_id(), "abc").unwrap();
    let chunks = vec![chunk(2, "alpha"), chunk(3, "beta")];
    let vectors = embedder.embed(&["alpha", "beta"]).unwrap();
    store.insert_batch(&chunks, &vectors).unwrap();

    RagEngine::new(
        store,
        Box::new(embedder),
        Reranker::new(scores, -3.5, 5),
        generator,
        AuditLog::new(audit_path),
        &QuerySettings::default(),
    )
}

#[test]
fn empty_rerank_result_short_circuits_generation() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("interactions.jsonl");
    let generator = RecordingGenerator::new("should not be used");
    let calls = Arc::clone(&generator.calls);
    let engine = engine_with(
        &dir.path().join("index"),
        &audit_path,
        Box::new(FixedScores(vec![-5.0, -4.0])),
        Box::new(generator),
    );

    let result = engine.query("What is a random forest?").unwrap();

    assert_eq!(result.answer, NOT_FOUND_ANSWER);
    assert!(result.contexts.is_empty());
    assert!(result.audit_error.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let logged = fs::read_to_string(&audit_path).unwrap();
    let entry: AuditLogEntry = serde_json::from_str(logged.trim()).unwrap();
    assert_eq!(entry.answer, NOT_FOUND_ANSWER);
    assert!(entry.contexts.is_empty());
}

#[test]
fn audit_failure_is_reported_without_failing_the_query() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(
        &dir.path().join("index"),
        dir.path(),
        Box::new(FixedScores(vec![1.0, 0.5])),
        Box::new(RecordingGenerator::new("An answer. [Page 2]")),
    );

    let result = engine.query("alpha?").unwrap();

    assert_eq!(result.answer, "An answer. [Page 2]");
    assert_eq!(result.contexts.len(), 2);
    assert!(result.audit_error.is_some());
}

#[test]
fn generation_failure_is_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(
        &dir.path().join("index"),
        &dir.path().join("interactions.jsonl"),
        Box::new(FixedScores(vec![1.0, 0.5])),
        Box::new(FailingGenerator),
    );

    assert!(matches!(
        engine.query("alpha?"),
        Err(RagError::Generation(_))
    ));
}

#[test]
fn every_query_appends_one_audit_line() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("logs").join("interactions.jsonl");
    let engine = engine_with(
        &dir.path().join("index"),
        &audit_path,
        Box::new(FixedScores(vec![1.0, 0.5])),
        Box::new(RecordingGenerator::new("An answer. [Page 2]")),
    );

    for question in ["first?", "second?", "third?"] {
        engine.query(question).unwrap();
    }

    let audit = AuditLog::new(&audit_path);
    assert_eq!(audit.count_records().unwrap(), 3);
    let questions = fs::read_to_string(&audit_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<AuditLogEntry>(line).unwrap().question)
        .collect::<Vec<String>>();
    assert_eq!(questions, vec!["first?", "second?", "third?"]);
}

struct FixedAnalyzer(DocumentStructure);

impl StructuralAnalyzer for FixedAnalyzer {
    fn analyze(&self, _source: &Path) -> Result<DocumentStructure> {
        Ok(self.0.clone())
    }
}

#[test]
fn answers_linear_regression_question_from_tagged_page() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::with_workspace(dir.path());
    fs::create_dir_all(config.paths.source_path.parent().unwrap()).unwrap();
    fs::write(&config.paths.source_path, b"%PDF-1.7 fixture").unwrap();

    let front_matter = "Contents\nPreface 1\nIntroduction 2\n".repeat(8);
    let body = format!(
        "## Linear Regression\n{}",
        "Linear regression is a simple approach for predicting a quantitative response \
         on the basis of a single predictor variable. "
            .repeat(4)
    );
    let analyzer = FixedAnalyzer(DocumentStructure {
        pages: vec![front_matter, body],
        outline: vec![
            OutlineEntry::new(1, "Contents", 1),
            OutlineEntry::new(1, "Linear Regression", 2),
        ],
    });
    let embedder = LocalHashEmbedder::new(64);
    IngestPipeline::new(&config, &analyzer, &embedder)
        .run()
        .unwrap();

    let store = VectorStore::open_existing(&config.paths.index_dir, Some(embedder.model_id()))
        .unwrap();
    let engine = RagEngine::new(
        store,
        Box::new(embedder),
        Reranker::new(Box::new(KeywordEncoder), -3.5, 5),
        Box::new(CitingGenerator),
        AuditLog::new(config.paths.audit_log_path.clone()),
        &config.query,
    );

    let question = "What is linear regression?";
    let retrieved = engine.retrieve(question, 15).unwrap();
    assert!(!retrieved.is_empty());
    assert_eq!(retrieved[0].metadata.physical_page, 2);
    assert_eq!(retrieved[0].metadata.chapter, "Linear Regression");

    let result = engine.query(question).unwrap();
    assert!(result.answer.contains("[Page 2]"));
    assert!(result.contexts[0].starts_with("Page 2: ## Linear Regression"));
    assert!(result.audit_error.is_none());
}

#[test]
fn engine_refuses_to_open_when_reranker_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::with_workspace(dir.path());
    config.models.embed_backend = EmbedBackend::LocalHash;
    config.models.rerank_url = "http://127.0.0.1:9".to_string();
    config.models.request_timeout = Duration::from_secs(2);

    let embedder = embedder_from_config(&config.models).unwrap();
    drop(VectorStore::recreate(&config.paths.index_dir, embedder.model_id(), "abc").unwrap());

    assert!(matches!(
        RagEngine::open(&config),
        Err(RagError::Configuration(message)) if message.contains("reranker")
    ));
}
