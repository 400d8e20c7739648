//! Text-generation provider clients.
//!
//! Each provider kind gets one `reqwest` client speaking its wire format;
//! orchestration code only ever sees the [`TextGenerator`] capability, so
//! providers are swappable through configuration alone.

use async_trait::async_trait;
use serde_json::json;

use notegarden_config::{ProviderConfig, ProviderKind};

use crate::GenerationError;

/// A backend that turns a prompt into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Select the client implementation for a provider entry.
pub fn build_generator(config: &ProviderConfig) -> Box<dyn TextGenerator> {
    match config.kind {
        ProviderKind::OpenAi | ProviderKind::OpenAiCompatible => {
            Box::new(OpenAiClient::new(config))
        }
        ProviderKind::Anthropic => Box::new(AnthropicClient::new(config)),
        ProviderKind::Google => Box::new(GoogleClient::new(config)),
    }
}

const MAX_COMPLETION_TOKENS: u32 = 2048;

// ── OpenAI / OpenAI-compatible ────────────────────────────────────────────────

/// Chat-completions client.  Covers both `openai` and any
/// `openai_compatible` endpoint via `base_url`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &ProviderConfig) -> Self {
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
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
            "max_tokens": MAX_COMPLETION_TOKENS,
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
            return Err(GenerationError::Backend {
                status: status.to_string(),
                body: body.to_string(),
            });
        }

        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                GenerationError::MalformedReply(format!("response missing text: {body}"))
            })
    }
}

// ── Anthropic ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl AnthropicClient {
    pub fn new(config: &ProviderConfig) -> Self {
        let base_url = if config.base_url.is_empty() {
            "https://api.anthropic.com".to_string()
        } else {
            config.base_url.trim_end_matches('/').to_string()
        };
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let endpoint = format!("{}/v1/messages", self.base_url);
        let payload = json!({
            "model": self.model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "temperature": self.temperature,
            "messages": [
                {"role": "user", "content": prompt}
            ],
        });

        let response = self
            .client
            .post(endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(GenerationError::Backend {
                status: status.to_string(),
                body: body.to_string(),
            });
        }

        body.get("content")
            .and_then(|content| content.get(0))
            .and_then(|block| block.get("text"))
            .and_then(|text| text.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                GenerationError::MalformedReply(format!("response missing text: {body}"))
            })
    }
}

// ── Google ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GoogleClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GoogleClient {
    pub fn new(config: &ProviderConfig) -> Self {
        let base_url = if config.base_url.is_empty() {
            "https://generativelanguage.googleapis.com/v1beta".to_string()
        } else {
            config.base_url.trim_end_matches('/').to_string()
        };
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl TextGenerator for GoogleClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let endpoint = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let payload = json!({
            "contents": [
                {"parts": [{"text": prompt}]}
            ],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": MAX_COMPLETION_TOKENS,
            },
        });

        let response = self.client.post(endpoint).json(&payload).send().await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(GenerationError::Backend {
                status: status.to_string(),
                body: body.to_string(),
            });
        }

        body.get("candidates")
            .and_then(|candidates| candidates.get(0))
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.get(0))
            .and_then(|part| part.get("text"))
            .and_then(|text| text.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                GenerationError::MalformedReply(format!("response missing text: {body}"))
            })
    }
}
