use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{build_client, check_status, endpoint, service_unreachable};
use crate::error::{RagError, Result};
use crate::query::Generator;
use crate::semantic::Embedder;

/// Embeddings through Ollama's `/api/embed`.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(RagError::Configuration(
                "missing embedding model name".to_string(),
            ));
        }
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint(base_url, "/api/embed")?,
            model: model.trim().to_string(),
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.model,
            input: inputs,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| RagError::Embedding(format!("request to {} failed: {err}", self.endpoint)))?;
        let response = check_status(response)
            .map_err(|reason| RagError::Embedding(format!("ollama returned {reason}")))?;
        let parsed: EmbedResponse = response
            .json()
            .map_err(|err| RagError::Embedding(format!("invalid embed response: {err}")))?;

        if parsed.embeddings.len() != inputs.len() {
            return Err(RagError::Embedding(format!(
                "ollama returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                inputs.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}

/// Single-shot, non-streaming completions through Ollama's `/api/generate`.
pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
    tags_endpoint: String,
    model: String,
    temperature: f32,
    json_format: bool,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(RagError::Configuration(
                "missing generation model name".to_string(),
            ));
        }
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint(base_url, "/api/generate")?,
            tags_endpoint: endpoint(base_url, "/api/tags")?,
            model: model.trim().to_string(),
            temperature: 0.0,
            json_format: false,
        })
    }

    /// Confirms the server answers and has the configured model pulled.
    pub fn ensure_ready(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.tags_endpoint)
            .send()
            .map_err(|err| service_unreachable("ollama", err))?;
        let response = check_status(response).map_err(|reason| service_unreachable("ollama", reason))?;
        let tags: TagsResponse = response
            .json()
            .map_err(|err| RagError::Configuration(format!("invalid ollama tags response: {err}")))?;

        if model_listed(&tags, &self.model) {
            Ok(())
        } else {
            Err(RagError::Configuration(format!(
                "generation model {} is not available on {}",
                self.model, self.tags_endpoint
            )))
        }
    }
}

/// Ollama lists untagged pulls as `<name>:latest`.
fn model_listed(tags: &TagsResponse, model: &str) -> bool {
    tags.models.iter().any(|listed| {
        listed.name == model || (!model.contains(':') && listed.name == format!("{model}:latest"))
    })
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: self.json_format.then_some("json"),
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| RagError::Generation(format!("request to {} failed: {err}", self.endpoint)))?;
        let response = check_status(response)
            .map_err(|reason| RagError::Generation(format!("ollama returned {reason}")))?;
        let parsed: GenerateResponse = response
            .json()
            .map_err(|err| RagError::Generation(format!("invalid generate response: {err}")))?;
        Ok(parsed.response)
    }

    fn request_json_output(&mut self) {
        self.json_format = true;
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ListedModel>,
}

#[derive(Debug, Deserialize)]
struct ListedModel {
    name: String,
}
