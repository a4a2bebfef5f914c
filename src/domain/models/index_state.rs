use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Per-surface checkpoint persisted as a small JSON file.
///
/// The pinned `embedding_dimension` must match what the vector store holds;
/// a mismatch at load time forces a full re-index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexState {
    pub last_commit: String,
    /// RFC 3339 timestamp of the last completed run.
    pub last_indexed_at: String,
    pub totals: IndexTotals,
    pub embedding_dimension: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexTotals {
    pub files: u64,
    pub chunks: u64,
    pub skipped: u64,
}

impl IndexState {
    pub fn new(
        last_commit: String,
        last_indexed_at: String,
        totals: IndexTotals,
        embedding_dimension: usize,
    ) -> Self {
        Self {
            last_commit,
            last_indexed_at,
            totals,
            embedding_dimension,
        }
    }

    /// Loads a state file. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, DomainError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let state = serde_json::from_str(&raw)
            .map_err(|e| DomainError::parse(format!("Invalid state file {}: {}", path.display(), e)))?;
        Ok(Some(state))
    }

    /// Writes atomically: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> Result<(), DomainError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DomainError::internal(format!("Failed to serialize state: {}", e)))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
