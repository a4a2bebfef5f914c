use async_trait::async_trait;

use crate::domain::{
    CodeChunk, CodeSearchResult, DomainError, FileProfile, Filter, GitChunk, Signal,
};

/// Table of embedded code chunks.
#[async_trait]
pub trait CodeVectorStore: Send + Sync {
    /// Creates the table if absent, pinned to `dimension`.
    async fn init(&self, dimension: usize) -> Result<(), DomainError>;

    /// Replaces the whole table with `chunks` in one generation swap.
    async fn overwrite(
        &self,
        chunks: &[CodeChunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError>;

    async fn append(&self, chunks: &[CodeChunk], vectors: &[Vec<f32>])
        -> Result<(), DomainError>;

    /// Deletes matching rows, returning how many went away.
    async fn delete(&self, filter: &Filter) -> Result<u64, DomainError>;

    /// Cosine kNN; scores are `1 - distance`.
    async fn search(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<CodeSearchResult>, DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;
}

/// Table of embedded history chunks.
#[async_trait]
pub trait HistoryVectorStore: Send + Sync {
    async fn init(&self, dimension: usize) -> Result<(), DomainError>;

    async fn overwrite(
        &self,
        chunks: &[GitChunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError>;

    async fn append(&self, chunks: &[GitChunk], vectors: &[Vec<f32>])
        -> Result<(), DomainError>;

    async fn delete(&self, filter: &Filter) -> Result<u64, DomainError>;

    async fn search(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<(GitChunk, f32)>, DomainError>;

    /// Projection read without a vector, optionally filtered and limited.
    async fn find(
        &self,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<GitChunk>, DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;
}

/// Table of detected signals.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn init(&self, dimension: usize) -> Result<(), DomainError>;

    async fn overwrite(
        &self,
        signals: &[Signal],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError>;

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(Signal, f32)>, DomainError>;

    /// Signals scoped to `directory` plus every root-scoped (`"."`) signal.
    async fn for_directory(&self, directory: &str) -> Result<Vec<Signal>, DomainError>;

    async fn all(&self) -> Result<Vec<Signal>, DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;
}

/// Table of per-file profiles. Scalar-only; profiles are looked up by path,
/// never vector-searched.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn init(&self) -> Result<(), DomainError>;

    async fn overwrite(&self, profiles: &[FileProfile]) -> Result<(), DomainError>;

    async fn get(&self, path: &str) -> Result<Option<FileProfile>, DomainError>;

    /// Profiles whose path starts with `prefix` (directory lookups).
    async fn for_prefix(&self, prefix: &str) -> Result<Vec<FileProfile>, DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;
}
