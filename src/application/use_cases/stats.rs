use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::application::{CodeVectorStore, HistoryVectorStore, ProfileStore, SignalStore};
use crate::domain::{DomainError, IndexState};

#[derive(Debug, Serialize)]
pub struct CodeStats {
    pub chunk_count: u64,
    pub state: Option<IndexState>,
}

#[derive(Debug, Serialize)]
pub struct GitStats {
    pub chunk_count: u64,
    pub signal_count: u64,
    pub profile_count: u64,
    pub state: Option<IndexState>,
}

/// Read-only statistics for the `stats` and `git-stats` commands.
pub struct StatsUseCase {
    code: Arc<dyn CodeVectorStore>,
    history: Arc<dyn HistoryVectorStore>,
    signals: Arc<dyn SignalStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl StatsUseCase {
    pub fn new(
        code: Arc<dyn CodeVectorStore>,
        history: Arc<dyn HistoryVectorStore>,
        signals: Arc<dyn SignalStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            code,
            history,
            signals,
            profiles,
        }
    }

    pub async fn code_stats(&self, state_path: &Path) -> Result<CodeStats, DomainError> {
        let chunk_count = self.code.count().await.unwrap_or(0);
        Ok(CodeStats {
            chunk_count,
            state: IndexState::load(state_path)?,
        })
    }

    pub async fn git_stats(&self, state_path: &Path) -> Result<GitStats, DomainError> {
        Ok(GitStats {
            chunk_count: self.history.count().await.unwrap_or(0),
            signal_count: self.signals.count().await.unwrap_or(0),
            profile_count: self.profiles.count().await.unwrap_or(0),
            state: IndexState::load(state_path)?,
        })
    }
}
