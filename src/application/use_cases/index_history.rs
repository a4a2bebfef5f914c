use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::application::{EmbedOptions, EmbeddingProvider, HistoryVectorStore};
use crate::connector::config::Config;
use crate::connector::git::{CommitChunker, CommitExtractor, ExtractOptions, GitClient};
use crate::domain::{DomainError, GitChunk, IndexState, IndexTotals, RawCommit};

#[derive(Debug)]
pub struct GitIndexReport {
    pub full: bool,
    pub commits_indexed: u64,
    pub commits_skipped: u64,
    pub chunks_indexed: u64,
    pub embedding_dimension: usize,
}

/// Orchestrates the history surface: stream the DAG, chunk, embed,
/// persist. Full runs overwrite the table; incremental runs append the
/// SHA range since the checkpoint.
pub struct IndexHistoryUseCase {
    store: Arc<dyn HistoryVectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    config: Config,
    repo_root: PathBuf,
    state_path: PathBuf,
}

impl IndexHistoryUseCase {
    pub fn new(
        store: Arc<dyn HistoryVectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: Config,
        repo_root: PathBuf,
        state_path: PathBuf,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            repo_root,
            state_path,
        }
    }

    pub async fn execute(
        &self,
        force_full: bool,
        max_commits: Option<usize>,
    ) -> Result<GitIndexReport, DomainError> {
        let git = GitClient::new(&self.repo_root)?;

        self.provider.health_check().await?;
        let dimension = self.provider.probe_dimension().await?;
        self.store.init(dimension).await?;

        // A corrupt state file reads as absent and forces a full run.
        let state = IndexState::load(&self.state_path).unwrap_or_else(|e| {
            warn!("Ignoring unreadable state file: {}", e);
            None
        });
        let incremental_base = match (&state, force_full) {
            (_, true) => None,
            (None, _) => None,
            (Some(state), _) => {
                if state.embedding_dimension != dimension {
                    warn!(
                        "Embedding dimension changed ({} -> {}); forcing full git re-index",
                        state.embedding_dimension, dimension
                    );
                    None
                } else if state.last_commit.is_empty()
                    || !git.commit_exists(&state.last_commit).await
                {
                    warn!("Base commit unreachable; forcing full git re-index");
                    None
                } else {
                    Some(state.last_commit.clone())
                }
            }
        };

        let mut options = ExtractOptions::from_git_config(&self.config.git)?;
        if let Some(max) = max_commits {
            options.max_commits = max;
        }
        if let Some(base) = &incremental_base {
            options = options.with_range(format!("{}..HEAD", base));
        }

        let start_time = Instant::now();
        let extractor = CommitExtractor::new(&self.repo_root, options)?;
        let outcome = extractor.extract().await?;
        info!(
            "Extracted {} commits ({} skipped)",
            outcome.commits.len(),
            outcome.skipped
        );

        let chunks = self.chunk_commits(&git, &outcome.commits).await?;
        let vectors = self.embed_chunks(&chunks, dimension).await?;
        let full = incremental_base.is_none();
        if full {
            self.store.overwrite(&chunks, &vectors).await?;
        } else {
            self.store.append(&chunks, &vectors).await?;
        }

        let previous_totals = state.map(|s| s.totals).unwrap_or_default();
        let totals = if full {
            IndexTotals {
                files: outcome.commits.len() as u64,
                chunks: chunks.len() as u64,
                skipped: outcome.skipped,
            }
        } else {
            IndexTotals {
                files: previous_totals.files + outcome.commits.len() as u64,
                chunks: previous_totals.chunks + chunks.len() as u64,
                skipped: previous_totals.skipped + outcome.skipped,
            }
        };
        let new_state = IndexState::new(
            git.head_sha().await?,
            Utc::now().to_rfc3339(),
            totals,
            dimension,
        );
        new_state.save(&self.state_path)?;

        info!(
            "Git index complete: {} commits -> {} chunks in {:.2}s",
            outcome.commits.len(),
            chunks.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(GitIndexReport {
            full,
            commits_indexed: outcome.commits.len() as u64,
            commits_skipped: outcome.skipped,
            chunks_indexed: chunks.len() as u64,
            embedding_dimension: dimension,
        })
    }

    /// Chunks every commit, pulling per-file patches only when file-diff
    /// chunks are enabled. Within one commit the summary chunk always
    /// precedes its file diffs.
    async fn chunk_commits(
        &self,
        git: &GitClient,
        commits: &[RawCommit],
    ) -> Result<Vec<GitChunk>, DomainError> {
        let chunker = CommitChunker::new(self.config.git.clone())?;
        let progress_bar = ProgressBar::new(commits.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} {bar:40.green/dim} {pos}/{len} {msg:.dim}")
                .expect("Invalid progress bar template")
                .progress_chars("━━─"),
        );

        let mut chunks = Vec::new();
        for commit in commits {
            progress_bar.set_message(commit.sha[..commit.sha.len().min(8)].to_string());
            let patches = if self.config.git.include_file_chunks && !commit.files.is_empty() {
                match git.commit_patch(&commit.sha).await {
                    Ok(patches) => Some(patches),
                    Err(e) => {
                        warn!("Failed to read patch for {}: {}", commit.sha, e);
                        None
                    }
                }
            } else {
                None
            };
            chunks.extend(chunker.chunk_commit(commit, patches.as_ref()));
            progress_bar.inc(1);
        }
        progress_bar.finish_and_clear();
        Ok(chunks)
    }

    async fn embed_chunks(
        &self,
        chunks: &[GitChunk],
        dimension: usize,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text().to_string()).collect();
        let options = EmbedOptions {
            batch_size: self.config.embedding_batch_size,
            dimension,
            prefix: Some("search_document: ".to_string()),
            ..EmbedOptions::default()
        };
        info!("Embedding {} history chunks", texts.len());
        self.provider.embed_batch(&texts, &options).await
    }
}
