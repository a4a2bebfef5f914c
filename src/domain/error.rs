use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Not a git repository: {0}")]
    NotAGitRepo(String),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding dimension mismatch: store holds {stored}, provider returns {probed}")]
    DimensionMismatch { stored: usize, probed: usize },

    #[error("Table '{table}' does not exist")]
    MissingTable { table: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::EmbeddingError(msg.into())
    }

    pub fn embedding_unavailable(msg: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable(msg.into())
    }

    pub fn missing_table(table: impl Into<String>) -> Self {
        Self::MissingTable {
            table: table.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }

    pub fn is_missing_table(&self) -> bool {
        matches!(self, Self::MissingTable { .. })
    }

    /// One-line remediation tip for errors the CLI surfaces to the user.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::EmbeddingUnavailable(_) => Some(
                "Check that the embedding host is running (e.g. `ollama serve`) \
                 or set OLLAMA_URL / OPENAI_API_KEY."
                    .to_string(),
            ),
            Self::MissingTable { table } => {
                let cmd = if table.starts_with("history") || table == "signals" {
                    "repolens git-index"
                } else {
                    "repolens index"
                };
                Some(format!("Run `{}` first to create the '{}' table.", cmd, table))
            }
            Self::DimensionMismatch { .. } => {
                Some("Re-run with --full to rebuild the index at the new dimension.".to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_table_hint_names_the_right_subcommand() {
        let code = DomainError::missing_table("code_chunks");
        assert!(code.hint().unwrap().contains("repolens index"));

        let history = DomainError::missing_table("history_chunks");
        assert!(history.hint().unwrap().contains("repolens git-index"));
    }

    #[test]
    fn test_dimension_mismatch_predicate() {
        let err = DomainError::DimensionMismatch {
            stored: 768,
            probed: 384,
        };
        assert!(err.is_dimension_mismatch());
        assert!(err.hint().is_some());
    }
}
