use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::batching::{embed_with_recovery, EmbedTransport};
use crate::application::{EmbedOptions, EmbeddingProvider};
use crate::domain::DomainError;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const TAGS_PATH: &str = "/api/tags";
const EMBED_PATH: &str = "/api/embed";

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// HTTP client for an Ollama-style embedding host.
///
/// Health is `GET /api/tags` (a models list); embedding is
/// `POST /api/embed` with `{model, input: [..]}` returning
/// `{embeddings: [[f32]]}`. The host comes from `OLLAMA_URL` /
/// `OLLAMA_BASE_URL`, defaulting to `http://localhost:11434`.
///
/// Before the health check the client sends a cheap probe with a
/// 2-second timeout so a stopped daemon fails fast instead of hanging.
pub struct OllamaProvider {
    client: reqwest::Client,
    probe_client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            probe_client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(2))
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
            model: model.into(),
            base_url: base.trim_end_matches('/').to_string(),
        }
    }

    /// Host from `OLLAMA_URL`, then `OLLAMA_BASE_URL`, then the default.
    pub fn from_env(model: impl Into<String>) -> Self {
        let base = std::env::var("OLLAMA_URL")
            .or_else(|_| std::env::var("OLLAMA_BASE_URL"))
            .unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        Self::new(model, base)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbedTransport for OllamaProvider {
    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let url = format!("{}{}", self.base_url, EMBED_PATH);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DomainError::embedding(format!("POST {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(DomainError::embedding(format!(
                "Embedding request returned {}",
                response.status()
            )));
        }
        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| DomainError::embedding(format!("Bad embed response: {}", e)))?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn supports_prefixes(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<(), DomainError> {
        let url = format!("{}{}", self.base_url, TAGS_PATH);
        let response = self.probe_client.get(&url).send().await.map_err(|e| {
            DomainError::embedding_unavailable(format!(
                "Ollama not reachable at {}: {}",
                self.base_url, e
            ))
        })?;
        if !response.status().is_success() {
            return Err(DomainError::embedding_unavailable(format!(
                "Ollama at {} returned {}",
                self.base_url,
                response.status()
            )));
        }
        let tags: TagsResponse = response.json().await.map_err(|e| {
            DomainError::embedding_unavailable(format!("Bad /api/tags response: {}", e))
        })?;
        let model_known = tags
            .models
            .iter()
            .any(|m| m.name == self.model || m.name.starts_with(&format!("{}:", self.model)));
        if !model_known && !tags.models.is_empty() {
            return Err(DomainError::embedding_unavailable(format!(
                "Model '{}' not found on Ollama host (run `ollama pull {}`)",
                self.model, self.model
            )));
        }
        Ok(())
    }

    async fn probe_dimension(&self) -> Result<usize, DomainError> {
        let vector = self.embed_single("dimension probe", None).await?;
        if vector.is_empty() {
            return Err(DomainError::embedding("Probe returned an empty vector"));
        }
        Ok(vector.len())
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        options: &EmbedOptions,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        embed_with_recovery(self, texts, options, self.supports_prefixes()).await
    }

    async fn embed_single(
        &self,
        text: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<f32>, DomainError> {
        let prepared = match prefix {
            Some(prefix) if self.supports_prefixes() => format!("{}{}", prefix, text),
            _ => text.to_string(),
        };
        let mut vectors = self.request_embeddings(&[prepared]).await?;
        if vectors.len() != 1 {
            return Err(DomainError::embedding(format!(
                "Expected 1 vector, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}
