use serde::{Deserialize, Serialize};

use super::{CodeChunk, GitChunk};

/// The dispatcher strategy that actually produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    Vector,
    TemporalVector,
    Pickaxe,
    Blame,
    StructuredGit,
}

impl RetrievalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::Vector => "vector",
            RetrievalMethod::TemporalVector => "temporal_vector",
            RetrievalMethod::Pickaxe => "pickaxe",
            RetrievalMethod::Blame => "blame",
            RetrievalMethod::StructuredGit => "structured_git",
        }
    }
}

impl std::fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scored code chunk. Scores are `1 - cosine distance`; higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSearchResult {
    chunk: CodeChunk,
    score: f32,
}

impl CodeSearchResult {
    pub fn new(chunk: CodeChunk, score: f32) -> Self {
        Self { chunk, score }
    }

    pub fn chunk(&self) -> &CodeChunk {
        &self.chunk
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}

/// A scored history chunk, tagged with the strategy that retrieved it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSearchResult {
    chunk: GitChunk,
    score: f32,
    retrieval_method: RetrievalMethod,
}

impl GitSearchResult {
    pub fn new(chunk: GitChunk, score: f32, retrieval_method: RetrievalMethod) -> Self {
        Self {
            chunk,
            score,
            retrieval_method,
        }
    }

    pub fn chunk(&self) -> &GitChunk {
        &self.chunk
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn retrieval_method(&self) -> RetrievalMethod {
        self.retrieval_method
    }
}
