use async_trait::async_trait;

use crate::domain::DomainError;

/// Character cap applied to every text before dispatch.
pub const MAX_EMBED_CHARS: usize = 8_000;

/// Options threaded through a batch-embedding run.
#[derive(Debug, Clone)]
pub struct EmbedOptions {
    /// Maximum texts per sub-batch.
    pub batch_size: usize,
    /// Maximum cumulative characters per sub-batch.
    pub max_batch_chars: usize,
    /// Target vector dimension (used for the zero-vector fallback).
    pub dimension: usize,
    pub verbose: bool,
    /// Prepended to each text, but only when the provider supports prefixes.
    pub prefix: Option<String>,
    /// Concurrent in-flight sub-batches.
    pub concurrency: usize,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_batch_chars: 28_000,
            dimension: 768,
            verbose: false,
            prefix: None,
            concurrency: 2,
        }
    }
}

impl EmbedOptions {
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

/// Generates dense vectors from text via an external service.
///
/// `embed_batch` must return exactly one vector per input text, in input
/// order, recovering from sub-batch failures internally (binary split,
/// progressive truncation, zero-vector fallback).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn supports_prefixes(&self) -> bool;

    async fn health_check(&self) -> Result<(), DomainError>;

    /// Embeds a probe text and returns the vector dimension.
    async fn probe_dimension(&self) -> Result<usize, DomainError>;

    async fn embed_batch(
        &self,
        texts: &[String],
        options: &EmbedOptions,
    ) -> Result<Vec<Vec<f32>>, DomainError>;

    async fn embed_single(
        &self,
        text: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<f32>, DomainError>;
}
