use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::DomainError;

/// Config file name looked up at the repo root.
pub const CONFIG_FILE: &str = ".repolensrc.json";

/// Tool configuration, merged over defaults from `.repolensrc.json`.
///
/// An unreadable or unparsable file is recoverable: the loader warns and
/// falls back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Include globs for file discovery.
    pub include: Vec<String>,
    /// Exclude globs (replaces the default set when non-empty).
    pub exclude: Vec<String>,
    /// Additional exclude globs, additive over `exclude`.
    pub exclude_patterns: Vec<String>,
    /// Files longer than this are skipped outright.
    pub max_file_lines: usize,
    pub index_tests: bool,
    pub chunk_max_tokens: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_batch_size: usize,
    pub search_limit: usize,
    pub git: GitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include: vec!["**/*".to_string()],
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/dist/**".to_string(),
                "**/build/**".to_string(),
                "**/target/**".to_string(),
                "**/.next/**".to_string(),
                "**/coverage/**".to_string(),
                "**/*.min.js".to_string(),
            ],
            exclude_patterns: vec![],
            max_file_lines: 3_000,
            index_tests: false,
            chunk_max_tokens: 512,
            embedding_provider: "ollama".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_batch_size: 32,
            search_limit: 10,
            git: GitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GitConfig {
    /// Emit one `file_diff` chunk per touched file.
    pub include_file_chunks: bool,
    /// Emit a `merge_group` chunk for multi-parent commits.
    pub include_merge_groups: bool,
    pub max_diff_lines_per_file: usize,
    pub enrich_low_quality_messages: bool,
    /// Subjects shorter than this are considered low quality.
    pub low_quality_threshold: usize,
    /// Case-insensitive substrings that mark an author as a bot.
    pub skip_bot_authors: Vec<String>,
    /// Case-insensitive regexes; a matching subject skips the commit.
    pub skip_message_patterns: Vec<String>,
    /// Stop after this many non-skipped commits; 0 = unbounded.
    pub max_commits: usize,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            include_file_chunks: true,
            include_merge_groups: false,
            max_diff_lines_per_file: 80,
            enrich_low_quality_messages: true,
            low_quality_threshold: 12,
            skip_bot_authors: vec![
                "dependabot".to_string(),
                "renovate".to_string(),
                "github-actions".to_string(),
                "[bot]".to_string(),
            ],
            skip_message_patterns: vec![],
            max_commits: 0,
        }
    }
}

impl Config {
    /// Loads `.repolensrc.json` from `repo_root`, merged over defaults.
    /// A missing file yields defaults; a broken file warns and yields
    /// defaults (config errors are recoverable by design).
    pub fn load(repo_root: &Path) -> Self {
        let path = repo_root.join(CONFIG_FILE);
        match Self::load_strict(&path) {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("{} — using defaults", e);
                Self::default()
            }
        }
    }

    fn load_strict(path: &Path) -> Result<Option<Self>, DomainError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            DomainError::ConfigParse(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(config))
    }

    /// All exclude globs: `exclude` plus the additive `excludePatterns`.
    pub fn all_excludes(&self) -> Vec<String> {
        let mut globs = self.exclude.clone();
        globs.extend(self.exclude_patterns.iter().cloned());
        globs
    }
}

/// Resolves the repository path: explicit flag, else `REPOLENS_REPO`,
/// else the current directory.
pub fn resolve_repo_path(flag: Option<&str>) -> PathBuf {
    if let Some(path) = flag {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("REPOLENS_REPO") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from(".")
}

/// Resolves the store directory: `REPOLENS_STORE_URI`, else `.repolens/`
/// under the repo root.
pub fn resolve_store_dir(repo_root: &Path) -> PathBuf {
    if let Ok(uri) = std::env::var("REPOLENS_STORE_URI") {
        if !uri.is_empty() {
            return PathBuf::from(uri);
        }
    }
    repo_root.join(".repolens")
}
