use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::batching::{embed_with_recovery, EmbedTransport};
use crate::application::{EmbedOptions, EmbeddingProvider};
use crate::domain::DomainError;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
const EMBEDDINGS_PATH: &str = "/v1/embeddings";
const MODELS_PATH: &str = "/v1/models";

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP client for the OpenAI embeddings API. The key comes from
/// `OPENAI_API_KEY`; prefixes are not supported by these models.
pub struct OpenAiProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base: String = base_url.into();
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            model: model.into(),
            base_url: base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Self {
        let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        Self::new(model, key, DEFAULT_OPENAI_URL)
    }
}

#[async_trait]
impl EmbedTransport for OpenAiProvider {
    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let url = format!("{}{}", self.base_url, EMBEDDINGS_PATH);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
            .map_err(|e| DomainError::embedding(format!("Bad embeddings response: {}", e)))?;
        // The API may reorder; indices restore input order.
        let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for datum in parsed.data {
            if datum.index < vectors.len() {
                vectors[datum.index] = datum.embedding;
            }
        }
        if vectors.iter().any(|v| v.is_empty()) {
            return Err(DomainError::embedding(
                "Embeddings response missing entries",
            ));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports_prefixes(&self) -> bool {
        false
    }

    async fn health_check(&self) -> Result<(), DomainError> {
        if self.api_key.is_empty() {
            return Err(DomainError::embedding_unavailable(
                "OPENAI_API_KEY is not set",
            ));
        }
        let url = format!("{}{}", self.base_url, MODELS_PATH);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                DomainError::embedding_unavailable(format!(
                    "OpenAI not reachable at {}: {}",
                    self.base_url, e
                ))
            })?;
        if !response.status().is_success() {
            return Err(DomainError::embedding_unavailable(format!(
                "OpenAI at {} returned {}",
                self.base_url,
                response.status()
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
        _prefix: Option<&str>,
    ) -> Result<Vec<f32>, DomainError> {
        let mut vectors = self.request_embeddings(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(DomainError::embedding(format!(
                "Expected 1 vector, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}
