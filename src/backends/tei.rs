use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{build_client, check_status, endpoint, service_unreachable};
use crate::error::{RagError, Result};
use crate::query::CrossEncoder;

/// Cross-encoder served behind a text-embeddings-inference `/rerank` route.
///
/// Scores are requested raw (logits), which is the scale the relevance
/// threshold is tuned on.
pub struct TeiCrossEncoder {
    client: Client,
    endpoint: String,
    health_endpoint: String,
    model: String,
}

impl TeiCrossEncoder {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint(base_url, "/rerank")?,
            health_endpoint: endpoint(base_url, "/health")?,
            model: model.trim().to_string(),
        })
    }

    pub fn ensure_ready(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.health_endpoint)
            .send()
            .map_err(|err| service_unreachable("reranker", err))?;
        check_status(response).map_err(|reason| service_unreachable("reranker", reason))?;
        Ok(())
    }
}

impl CrossEncoder for TeiCrossEncoder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            query,
            texts: passages,
            raw_scores: true,
            truncate: true,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| RagError::Rerank(format!("request to {} failed: {err}", self.endpoint)))?;
        let response = check_status(response)
            .map_err(|reason| RagError::Rerank(format!("reranker returned {reason}")))?;
        let ranked: Vec<RankedPassage> = response
            .json()
            .map_err(|err| RagError::Rerank(format!("invalid rerank response: {err}")))?;

        scores_by_index(&ranked, passages.len())
    }
}

fn scores_by_index(ranked: &[RankedPassage], expected: usize) -> Result<Vec<f32>> {
    let mut scores = vec![None; expected];
    for passage in ranked {
        let slot = scores.get_mut(passage.index).ok_or_else(|| {
            RagError::Rerank(format!(
                "reranker returned index {} for {expected} passages",
                passage.index
            ))
        })?;
        *slot = Some(passage.score);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| {
            score.ok_or_else(|| RagError::Rerank(format!("reranker omitted passage {index}")))
        })
        .collect()
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [&'a str],
    raw_scores: bool,
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct RankedPassage {
    index: usize,
    score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_restored_to_input_order() {
        let ranked: Vec<RankedPassage> =
            serde_json::from_str(r#"[{"index":2,"score":4.5},{"index":0,"score":-1.0},{"index":1,"score":-7.25}]"#)
                .unwrap();
        assert_eq!(scores_by_index(&ranked, 3).unwrap(), vec![-1.0, -7.25, 4.5]);
    }

    #[test]
    fn unreachable_reranker_is_a_configuration_error() {
        let encoder = TeiCrossEncoder::new(
            "http://127.0.0.1:9",
            "cross-encoder/ms-marco-MiniLM-L-6-v2",
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(matches!(encoder.ensure_ready(), Err(RagError::Configuration(_))));
    }

    #[test]
    fn missing_or_out_of_range_indices_fail_closed() {
        let missing = vec![RankedPassage { index: 0, score: 1.0 }];
        assert!(matches!(scores_by_index(&missing, 2), Err(RagError::Rerank(_))));

        let out_of_range = vec![RankedPassage { index: 5, score: 1.0 }];
        assert!(matches!(scores_by_index(&out_of_range, 2), Err(RagError::Rerank(_))));
    }
}
