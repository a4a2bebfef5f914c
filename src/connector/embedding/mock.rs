use async_trait::async_trait;
use rand::Rng;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::application::{EmbedOptions, EmbeddingProvider};
use crate::domain::DomainError;

/// Deterministic in-process provider for tests: the text hash seeds an RNG
/// producing a normalized vector, so identical texts embed identically.
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self { dimensions: 384 }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for x in &mut vector {
                *x /= magnitude;
            }
        }
        vector
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports_prefixes(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn probe_dimension(&self) -> Result<usize, DomainError> {
        Ok(self.dimensions)
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        options: &EmbedOptions,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        let prefix = options.prefix.as_deref().unwrap_or("");
        Ok(texts
            .iter()
            .map(|t| self.generate(&format!("{}{}", prefix, t)))
            .collect())
    }

    async fn embed_single(
        &self,
        text: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<f32>, DomainError> {
        Ok(self.generate(&format!("{}{}", prefix.unwrap_or(""), text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedding_consistency() {
        let provider = MockProvider::new();
        let a = provider.embed_single("hello world", None).await.unwrap();
        let b = provider.embed_single("hello world", None).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_mock_embedding_dimensions() {
        let provider = MockProvider::with_dimensions(128);
        let vector = provider.embed_single("test", None).await.unwrap();
        assert_eq!(vector.len(), 128);
        assert_eq!(provider.probe_dimension().await.unwrap(), 128);
    }

    #[tokio::test]
    async fn test_mock_embedding_normalized() {
        let provider = MockProvider::new();
        let vector = provider.embed_single("test", None).await.unwrap();
        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_mock_batch_matches_input_length() {
        let provider = MockProvider::new();
        let texts: Vec<String> = (0..5).map(|i| format!("text {}", i)).collect();
        let vectors = provider
            .embed_batch(&texts, &EmbedOptions::default())
            .await
            .unwrap();
        assert_eq!(vectors.len(), texts.len());
    }
}
