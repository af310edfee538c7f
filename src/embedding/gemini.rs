//! Hosted embedding provider backed by the Gemini `embedContent` API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{http_client, validate_vector, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiProvider {
    /// Unset model and base URL fall back to the Gemini defaults.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let config = &EmbeddingConfig {
            provider: "gemini".into(),
            ..config.clone()
        }
        .resolved();
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("missing Gemini API key (set GEMINI_API_KEY)".into()))?;

        let endpoint = format!(
            "{}/models/{}:embedContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client: http_client(config)?,
            endpoint,
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedContentRequest {
            content: Content {
                parts: vec![Part { text }],
            },
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Embedding(format!(
                "gemini returned HTTP {status}: {body}"
            )));
        }

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("failed to parse gemini response: {e}")))?;
        validate_vector(self.name(), parsed.embedding.values)
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}
