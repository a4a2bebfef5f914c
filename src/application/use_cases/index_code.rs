use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::application::{CodeVectorStore, EmbedOptions, EmbeddingProvider};
use crate::connector::chunker::ChunkerRegistry;
use crate::connector::config::Config;
use crate::connector::git::GitClient;
use crate::domain::{
    CodeChunk, DomainError, Filter, IndexState, IndexTotals,
};

/// Days covered by `--recent` mode.
const RECENT_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Full,
    Incremental,
    Recent,
}

impl IndexMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMode::Full => "full",
            IndexMode::Incremental => "incremental",
            IndexMode::Recent => "recent",
        }
    }
}

/// Outcome summary surfaced by the CLI.
#[derive(Debug)]
pub struct IndexReport {
    pub mode: IndexMode,
    pub files_indexed: u64,
    pub chunks_indexed: u64,
    pub files_skipped: u64,
    pub chunks_deleted: u64,
    pub embedding_dimension: usize,
}

/// Orchestrates the code surface: discover → chunk → embed → persist →
/// checkpoint. Falls back from incremental to full on missing state, a
/// missing base commit, or an embedding-dimension change.
pub struct IndexCodeUseCase {
    store: Arc<dyn CodeVectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    config: Config,
    repo_root: PathBuf,
    state_path: PathBuf,
}

impl IndexCodeUseCase {
    pub fn new(
        store: Arc<dyn CodeVectorStore>,
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

    pub async fn execute(&self, force_full: bool, recent: bool) -> Result<IndexReport, DomainError> {
        if !self.repo_root.exists() {
            return Err(DomainError::RepoNotFound(
                self.repo_root.display().to_string(),
            ));
        }

        self.provider.health_check().await?;
        let dimension = self.provider.probe_dimension().await?;
        self.store.init(dimension).await?;

        if recent {
            return self.recent_index(dimension).await;
        }

        // A corrupt state file reads as absent and forces a full run.
        let state = IndexState::load(&self.state_path).unwrap_or_else(|e| {
            warn!("Ignoring unreadable state file: {}", e);
            None
        });
        let mode = match (&state, force_full) {
            (_, true) => IndexMode::Full,
            (None, _) => {
                info!("No index state found; running a full index");
                IndexMode::Full
            }
            (Some(state), _) => {
                if state.embedding_dimension != dimension {
                    warn!(
                        "Embedding dimension changed ({} -> {}); forcing full re-index",
                        state.embedding_dimension, dimension
                    );
                    IndexMode::Full
                } else if !self.base_commit_reachable(&state.last_commit).await {
                    warn!(
                        "Base commit {} is unreachable; forcing full re-index",
                        state.last_commit
                    );
                    IndexMode::Full
                } else {
                    IndexMode::Incremental
                }
            }
        };

        match mode {
            IndexMode::Full => self.full_index(dimension).await,
            IndexMode::Incremental => {
                self.incremental_index(dimension, state.expect("state checked above"))
                    .await
            }
            IndexMode::Recent => unreachable!("recent handled above"),
        }
    }

    async fn base_commit_reachable(&self, sha: &str) -> bool {
        if sha.is_empty() {
            return false;
        }
        match GitClient::new(&self.repo_root) {
            Ok(git) => git.commit_exists(sha).await,
            Err(_) => false,
        }
    }

    async fn head_sha(&self) -> String {
        match GitClient::new(&self.repo_root) {
            Ok(git) => git.head_sha().await.unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    async fn full_index(&self, dimension: usize) -> Result<IndexReport, DomainError> {
        let start_time = Instant::now();
        let mut registry = ChunkerRegistry::with_default_languages()?;
        let files = self.discover_files()?;
        info!("Found {} files to index", files.len());

        let progress_bar = ProgressBar::new(files.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} {bar:40.green/dim} {pos}/{len} {msg:.dim}")
                .expect("Invalid progress bar template")
                .progress_chars("━━─"),
        );

        let mut chunks: Vec<CodeChunk> = Vec::new();
        let mut files_indexed = 0u64;
        let mut files_skipped = 0u64;
        for path in &files {
            let relative = self.relative(path);
            progress_bar.set_message(relative.clone());
            if let Some(file_chunks) = self.chunk_one(&mut registry, path, &mut files_skipped).await
            {
                files_indexed += 1;
                chunks.extend(file_chunks);
            }
            progress_bar.inc(1);
        }
        progress_bar.finish_and_clear();

        let vectors = self.embed_chunks(&chunks, dimension).await?;
        self.store.overwrite(&chunks, &vectors).await?;

        let state = IndexState::new(
            self.head_sha().await,
            Utc::now().to_rfc3339(),
            IndexTotals {
                files: files_indexed,
                chunks: chunks.len() as u64,
                skipped: files_skipped,
            },
            dimension,
        );
        state.save(&self.state_path)?;

        info!(
            "Full index complete: {} files, {} chunks in {:.2}s",
            files_indexed,
            chunks.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(IndexReport {
            mode: IndexMode::Full,
            files_indexed,
            chunks_indexed: chunks.len() as u64,
            files_skipped,
            chunks_deleted: 0,
            embedding_dimension: dimension,
        })
    }

    async fn incremental_index(
        &self,
        dimension: usize,
        state: IndexState,
    ) -> Result<IndexReport, DomainError> {
        let start_time = Instant::now();
        let git = GitClient::new(&self.repo_root)?;
        let changed = git.changed_files_since(&state.last_commit).await?;
        info!(
            "{} files changed since {}",
            changed.len(),
            &state.last_commit[..state.last_commit.len().min(8)]
        );

        let mut registry = ChunkerRegistry::with_default_languages()?;
        let mut chunks_deleted = 0u64;
        let mut files_indexed = 0u64;
        let mut files_skipped = 0u64;
        let mut new_chunks: Vec<CodeChunk> = Vec::new();

        for relative in &changed {
            let absolute = self.repo_root.join(relative);
            if !self.path_matches_globs(relative)? || !registry.supports(&absolute) {
                continue;
            }
            // Old chunks of the path go away before any new ones land.
            chunks_deleted += self
                .store
                .delete(&Filter::eq_str("file_path", relative.clone()))
                .await?;
            if !absolute.exists() {
                debug!("File deleted: {}", relative);
                continue;
            }
            if let Some(file_chunks) = self
                .chunk_one(&mut registry, &absolute, &mut files_skipped)
                .await
            {
                files_indexed += 1;
                new_chunks.extend(file_chunks);
            }
        }

        let vectors = self.embed_chunks(&new_chunks, dimension).await?;
        self.store.append(&new_chunks, &vectors).await?;

        let new_state = IndexState::new(
            self.head_sha().await,
            Utc::now().to_rfc3339(),
            IndexTotals {
                files: state.totals.files + files_indexed,
                chunks: state.totals.chunks + new_chunks.len() as u64 - chunks_deleted.min(state.totals.chunks),
                skipped: state.totals.skipped + files_skipped,
            },
            dimension,
        );
        new_state.save(&self.state_path)?;

        info!(
            "Incremental index complete: {} deleted, {} inserted in {:.2}s",
            chunks_deleted,
            new_chunks.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(IndexReport {
            mode: IndexMode::Incremental,
            files_indexed,
            chunks_indexed: new_chunks.len() as u64,
            files_skipped,
            chunks_deleted,
            embedding_dimension: dimension,
        })
    }

    /// Re-indexes only files touched in the last 30 days.
    async fn recent_index(&self, dimension: usize) -> Result<IndexReport, DomainError> {
        let git = GitClient::new(&self.repo_root)?;
        let recent = git.recent_files(RECENT_DAYS).await?;
        info!("{} files touched in the last {} days", recent.len(), RECENT_DAYS);

        let mut registry = ChunkerRegistry::with_default_languages()?;
        let mut chunks_deleted = 0u64;
        let mut files_indexed = 0u64;
        let mut files_skipped = 0u64;
        let mut new_chunks: Vec<CodeChunk> = Vec::new();

        for relative in &recent {
            let absolute = self.repo_root.join(relative);
            if !self.path_matches_globs(relative)? || !registry.supports(&absolute) {
                continue;
            }
            chunks_deleted += self
                .store
                .delete(&Filter::eq_str("file_path", relative.clone()))
                .await?;
            if !absolute.exists() {
                continue;
            }
            if let Some(file_chunks) = self
                .chunk_one(&mut registry, &absolute, &mut files_skipped)
                .await
            {
                files_indexed += 1;
                new_chunks.extend(file_chunks);
            }
        }

        let vectors = self.embed_chunks(&new_chunks, dimension).await?;
        self.store.append(&new_chunks, &vectors).await?;

        info!(
            "Recent index complete: {} files, {} chunks",
            files_indexed,
            new_chunks.len()
        );
        Ok(IndexReport {
            mode: IndexMode::Recent,
            files_indexed,
            chunks_indexed: new_chunks.len() as u64,
            files_skipped,
            chunks_deleted,
            embedding_dimension: dimension,
        })
    }

    /// Reads and chunks one file. Returns `None` (and counts) for
    /// oversized, test, unreadable or unparsable files.
    async fn chunk_one(
        &self,
        registry: &mut ChunkerRegistry,
        path: &Path,
        files_skipped: &mut u64,
    ) -> Option<Vec<CodeChunk>> {
        let relative = self.relative(path);
        if !self.config.index_tests && registry.is_test_file(&relative) {
            debug!("Skipping test file: {}", relative);
            return None;
        }
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", relative, e);
                *files_skipped += 1;
                return None;
            }
        };
        if content.lines().count() > self.config.max_file_lines {
            debug!("Skipping oversized file: {}", relative);
            *files_skipped += 1;
            return None;
        }
        match registry.chunk_file(path, &content, &self.repo_root, self.config.chunk_max_tokens) {
            Ok(Some(chunks)) => Some(chunks),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to parse {}: {}", relative, e);
                *files_skipped += 1;
                None
            }
        }
    }

    async fn embed_chunks(
        &self,
        chunks: &[CodeChunk],
        dimension: usize,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content().to_string()).collect();
        let options = EmbedOptions {
            batch_size: self.config.embedding_batch_size,
            dimension,
            prefix: Some("search_document: ".to_string()),
            ..EmbedOptions::default()
        };
        info!("Embedding {} chunks", texts.len());
        self.provider.embed_batch(&texts, &options).await
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.repo_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn build_globset(globs: &[String]) -> Result<GlobSet, DomainError> {
        let mut builder = GlobSetBuilder::new();
        for glob in globs {
            builder.add(
                Glob::new(glob)
                    .map_err(|e| DomainError::ConfigParse(format!("Bad glob {}: {}", glob, e)))?,
            );
        }
        builder
            .build()
            .map_err(|e| DomainError::ConfigParse(format!("Bad glob set: {}", e)))
    }

    fn path_matches_globs(&self, relative: &str) -> Result<bool, DomainError> {
        let include = Self::build_globset(&self.config.include)?;
        let exclude = Self::build_globset(&self.config.all_excludes())?;
        Ok(include.is_match(relative) && !exclude.is_match(relative))
    }

    /// Gitignore-aware walk filtered by the config globs.
    fn discover_files(&self) -> Result<Vec<PathBuf>, DomainError> {
        let include = Self::build_globset(&self.config.include)?;
        let exclude = Self::build_globset(&self.config.all_excludes())?;

        let mut files = Vec::new();
        let walker = WalkBuilder::new(&self.repo_root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .build();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Error walking directory: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let relative = self.relative(path);
            if include.is_match(&relative) && !exclude.is_match(&relative) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}
