//! Online question answering: retrieve, rerank, assemble, generate, audit.

mod context;
mod engine;
mod generation;
mod rerank;

pub use engine::RagEngine;

use crate::error::Result;

/// Text generation model behind the answer step.
pub trait Generator: Send + Sync {
    /// One synchronous, deterministic completion of `prompt`.
    fn generate(&self, prompt: &str) -> Result<String>;

    /// Asks the backend to constrain its output to JSON where it can.
    fn request_json_output(&mut self) {}
}

/// Cross-encoder scoring (query, passage) pairs jointly.
pub trait CrossEncoder: Send + Sync {
    fn model_id(&self) -> &str;

    /// One raw relevance score per passage, in input order.
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

#[cfg(test)]
mod tests;
