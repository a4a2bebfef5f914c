use std::sync::Arc;

use crate::application::{CodeVectorStore, EmbeddingProvider};
use crate::connector::config::Config;
use crate::domain::{CodeSearchResult, DomainError, Filter};

/// Vector search over the code surface, with an optional path-prefix
/// filter (`--filter src/auth/`).
pub struct QueryCodeUseCase {
    store: Arc<dyn CodeVectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    config: Config,
}

impl QueryCodeUseCase {
    pub fn new(
        store: Arc<dyn CodeVectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: Config,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub async fn execute(
        &self,
        query: &str,
        limit: Option<usize>,
        path_prefix: Option<&str>,
    ) -> Result<Vec<CodeSearchResult>, DomainError> {
        let limit = limit.unwrap_or(self.config.search_limit);
        let vector = self
            .provider
            .embed_single(query, Some("search_query: "))
            .await?;
        let filter = path_prefix.map(|prefix| Filter::like_prefix("file_path", prefix));
        let mut results = self.store.search(&vector, filter.as_ref(), limit).await?;
        results.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }
}
