//! Text-to-vector embedding providers.
//!
//! Provides the [`EmbeddingProvider`] trait and two HTTP-backed implementations:
//! [`gemini::GeminiProvider`] (hosted) and [`ollama::OllamaProvider`] (local).
//! The provider is selected from configuration via [`create_provider`].
//!
//! Dimensionality is provider-defined. A corpus should be embedded by one
//! provider consistently; the ranker skips vectors whose length differs from
//! the query's.

pub mod gemini;
pub mod ollama;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Trait for embedding text into vectors.
///
/// Calls are network-bound with highly variable latency. Callers fan out
/// rather than serialize them.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Provider identifier, e.g. `"ollama"`.
    fn name(&self) -> &str;

    /// Model identifier as sent to the provider.
    fn model(&self) -> &str;
}

/// `provider/model` marker recorded next to stored embeddings.
pub fn model_marker(provider: &dyn EmbeddingProvider) -> String {
    format!("{}/{}", provider.name(), provider.model())
}

/// Create an embedding provider from config.
///
/// Supported: `"gemini"` and `"ollama"`. Unset model and endpoint fall back
/// to the selected provider's defaults.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(gemini::GeminiProvider::new(config)?)),
        "ollama" => Ok(Box::new(ollama::OllamaProvider::new(config)?)),
        other => Err(Error::Config(format!(
            "unknown embedding provider: {other}. Supported: gemini, ollama"
        ))),
    }
}

/// Reject vectors that cannot take part in similarity scoring.
pub(crate) fn validate_vector(provider: &str, vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(Error::Embedding(format!("{provider} returned an empty vector")));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::Embedding(format!(
            "{provider} returned a vector with non-finite values"
        )));
    }
    Ok(vector)
}

/// Build the HTTP client shared by the providers.
pub(crate) fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| Error::Config(format!("failed to build embedding HTTP client: {e}")))
}
