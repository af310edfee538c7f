//! Locally-hosted embedding provider backed by Ollama's `/api/embeddings`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{http_client, validate_vector, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

pub struct OllamaProvider {
    client: Client,
    url: String,
    model: String,
}

impl OllamaProvider {
    /// Unset model and URL fall back to the Ollama defaults.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let config = &EmbeddingConfig {
            provider: "ollama".into(),
            ..config.clone()
        }
        .resolved();
        if config.model.trim().is_empty() {
            return Err(Error::Config("missing Ollama model name".into()));
        }
        Ok(Self {
            client: http_client(config)?,
            url: config.base_url.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Embedding(format!(
                "ollama returned non-200 status: {status}"
            )));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("failed to parse ollama response: {e}")))?;
        validate_vector(self.name(), parsed.embedding)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}
