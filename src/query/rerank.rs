use tracing::debug;

use super::CrossEncoder;
use crate::error::{RagError, Result};
use crate::model::{Chunk, ScoredChunk};

/// Precision filter over the first-stage candidates.
pub struct Reranker {
    encoder: Box<dyn CrossEncoder>,
    threshold: f32,
    top_k: usize,
}

impl Reranker {
    pub fn new(encoder: Box<dyn CrossEncoder>, threshold: f32, top_k: usize) -> Self {
        Self {
            encoder,
            threshold,
            top_k,
        }
    }

    /// Scores every candidate against `query` and keeps the best `top_k`
    /// whose score is strictly above the threshold, best first.
    pub fn rerank(&self, query: &str, candidates: Vec<Chunk>) -> Result<Vec<ScoredChunk>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let passages = candidates
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<&str>>();
        let scores = self.encoder.score(query, &passages)?;
        if scores.len() != candidates.len() {
            return Err(RagError::Rerank(format!(
                "{} returned {} scores for {} candidates",
                self.encoder.model_id(),
                scores.len(),
                candidates.len()
            )));
        }

        let candidate_count = candidates.len();
        let selected = select_relevant(candidates, scores, self.threshold, self.top_k);
        debug!(
            model_id = %self.encoder.model_id(),
            candidates = candidate_count,
            selected = selected.len(),
            threshold = self.threshold,
            "reranked candidates"
        );
        Ok(selected)
    }
}

pub fn select_relevant(
    chunks: Vec<Chunk>,
    scores: Vec<f32>,
    threshold: f32,
    top_k: usize,
) -> Vec<ScoredChunk> {
    let mut scored = chunks
        .into_iter()
        .zip(scores)
        .map(|(chunk, score)| ScoredChunk { chunk, score })
        .collect::<Vec<ScoredChunk>>();

    scored.sort_by(|left, right| right.score.total_cmp(&left.score));
    scored.retain(|candidate| candidate.score > threshold);
    scored.truncate(top_k);
    scored
}
