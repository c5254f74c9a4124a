//! HTTP clients for the model services the pipelines treat as opaque.

use std::time::Duration;

use reqwest::blocking::{Client, Response};

use crate::cli::EmbedBackend;
use crate::config::ModelConfig;
use crate::error::{RagError, Result};
use crate::semantic::{Embedder, LocalHashEmbedder};

mod ollama;
mod tei;

pub use ollama::{OllamaEmbedder, OllamaGenerator};
pub use tei::TeiCrossEncoder;

/// Embedding backend selected by configuration. Ingestion and querying must
/// resolve to the same model id for an index to be usable.
pub fn embedder_from_config(models: &ModelConfig) -> Result<Box<dyn Embedder>> {
    match models.embed_backend {
        EmbedBackend::LocalHash => Ok(Box::new(LocalHashEmbedder::new(models.embed_dimensions))),
        EmbedBackend::Ollama => Ok(Box::new(OllamaEmbedder::new(
            &models.ollama_url,
            &models.embed_model,
            models.request_timeout,
        )?)),
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| RagError::Configuration(format!("failed to build HTTP client: {err}")))
}

fn endpoint(base_url: &str, path: &str) -> Result<String> {
    let base = base_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(RagError::Configuration(format!(
            "missing base URL for {path}"
        )));
    }
    Ok(format!("{base}{path}"))
}

/// Embeds a short string so an unreachable or misconfigured embedding model
/// fails at startup instead of mid-run.
pub fn ensure_embedder_ready(embedder: &dyn Embedder) -> Result<()> {
    let vectors = embedder.embed(&[READINESS_TEXT]).map_err(|err| {
        RagError::Configuration(format!(
            "embedding model {} is unreachable: {err}",
            embedder.model_id()
        ))
    })?;
    match vectors.first() {
        Some(vector) if !vector.is_empty() => Ok(()),
        _ => Err(RagError::Configuration(format!(
            "embedding model {} returned no vector",
            embedder.model_id()
        ))),
    }
}

const READINESS_TEXT: &str = "readiness check";

fn service_unreachable(service: &str, err: impl std::fmt::Display) -> RagError {
    RagError::Configuration(format!("{service} is unreachable: {err}"))
}

/// Returns the response untouched on 2xx, otherwise its status and body.
fn check_status(response: Response) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(format!("{status}: {}", body.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("http://localhost:11434/", "/api/generate").unwrap(),
            "http://localhost:11434/api/generate"
        );
        assert!(matches!(
            endpoint("  ", "/rerank"),
            Err(RagError::Configuration(_))
        ));
    }

    struct DownEmbedder;

    impl Embedder for DownEmbedder {
        fn model_id(&self) -> &str {
            "down"
        }

        fn embed(&self, _inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::Embedding("connection refused".to_string()))
        }
    }

    #[test]
    fn embedder_readiness_failure_is_a_configuration_error() {
        let err = ensure_embedder_ready(&DownEmbedder).unwrap_err();
        assert!(matches!(&err, RagError::Configuration(message) if message.contains("connection refused")));
        assert!(ensure_embedder_ready(&LocalHashEmbedder::new(8)).is_ok());
    }

    #[test]
    fn local_hash_backend_needs_no_service() {
        let models = ModelConfig {
            embed_backend: EmbedBackend::LocalHash,
            embed_dimensions: 64,
            ..ModelConfig::default()
        };
        let embedder = embedder_from_config(&models).unwrap();
        assert_eq!(embedder.model_id(), "local-hash-v1-64");
        assert_eq!(embedder.embed(&["ridge"]).unwrap()[0].len(), 64);
    }
}
