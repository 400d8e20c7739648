//! Embedding backend clients.

use async_trait::async_trait;
use serde_json::json;

use notegarden_config::{EmbeddingBackend, EmbeddingConfig};

use crate::IndexError;

/// A backend that turns text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError>;
}

/// Select the embedding client for the configured backend.
pub fn build_embedder(config: &EmbeddingConfig) -> Box<dyn Embedder> {
    match config.backend {
        EmbeddingBackend::Ollama => Box::new(OllamaEmbedder::new(config)),
        EmbeddingBackend::Api => Box::new(ApiEmbedder::new(config)),
    }
}

// ── Ollama (local) ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let base_url = if config.base_url.is_empty() {
            "http://localhost:11434".to_string()
        } else {
            config.base_url.trim_end_matches('/').to_string()
        };
        Self {
            client: reqwest::Client::new(),
            base_url,
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let endpoint = format!("{}/api/embeddings", self.base_url);
        let payload = json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self.client.post(endpoint).json(&payload).send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(IndexError::Backend {
                status: status.to_string(),
                body: body.to_string(),
            });
        }

        parse_vector(body.get("embedding"), &body)
    }
}

// ── OpenAI-compatible embeddings API (remote) ─────────────────────────────────

#[derive(Debug, Clone)]
pub struct ApiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ApiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let base_url = if config.base_url.is_empty() {
            "https://api.openai.com/v1".to_string()
        } else {
            config.base_url.trim_end_matches('/').to_string()
        };
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let endpoint = format!("{}/embeddings", self.base_url);
        let payload = json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(IndexError::Backend {
                status: status.to_string(),
                body: body.to_string(),
            });
        }

        let vector = body
            .get("data")
            .and_then(|data| data.get(0))
            .and_then(|first| first.get("embedding"));
        parse_vector(vector, &body)
    }
}

fn parse_vector(
    value: Option<&serde_json::Value>,
    body: &serde_json::Value,
) -> Result<Vec<f32>, IndexError> {
    let items = value.and_then(|v| v.as_array()).ok_or_else(|| {
        IndexError::MalformedReply(format!("response missing embedding array: {body}"))
    })?;

    items
        .iter()
        .map(|item| {
            item.as_f64().map(|f| f as f32).ok_or_else(|| {
                IndexError::MalformedReply("non-numeric value in embedding".to_string())
            })
        })
        .collect()
}
