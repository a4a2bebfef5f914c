mod batching;
mod mock;
mod ollama;
mod openai;

pub use batching::{embed_with_recovery, EmbedTransport};
pub use mock::MockProvider;
pub use ollama::{OllamaProvider, DEFAULT_OLLAMA_URL};
pub use openai::OpenAiProvider;

use std::sync::Arc;

use crate::application::EmbeddingProvider;
use crate::domain::DomainError;

/// Builds the configured provider by name.
pub fn provider_from_name(
    provider: &str,
    model: &str,
) -> Result<Arc<dyn EmbeddingProvider>, DomainError> {
    match provider {
        "ollama" => Ok(Arc::new(OllamaProvider::from_env(model))),
        "openai" => Ok(Arc::new(OpenAiProvider::from_env(model))),
        "mock" => Ok(Arc::new(MockProvider::new())),
        other => Err(DomainError::invalid_input(format!(
            "Unknown embedding provider '{}' (expected ollama or openai)",
            other
        ))),
    }
}
