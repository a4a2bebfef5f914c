use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::domain::DomainError;

/// Thin wrapper over the `git` binary for everything outside the log
/// stream: revision lookups, changed-file listings, pickaxe, blame,
/// grep-log and per-commit patches.
pub struct GitClient {
    repo_root: PathBuf,
}

impl GitClient {
    pub fn new(repo_root: &Path) -> Result<Self, DomainError> {
        if !repo_root.exists() {
            return Err(DomainError::RepoNotFound(repo_root.display().to_string()));
        }
        if !repo_root.join(".git").exists() {
            return Err(DomainError::NotAGitRepo(repo_root.display().to_string()));
        }
        Ok(Self {
            repo_root: repo_root.to_path_buf(),
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn run(&self, args: &[&str]) -> Result<String, DomainError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to run git: {}", e)))?;
        if !output.status.success() {
            return Err(DomainError::storage(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub async fn head_sha(&self) -> Result<String, DomainError> {
        Ok(self.run(&["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    /// Whether `sha` still resolves to a commit in this repository.
    pub async fn commit_exists(&self, sha: &str) -> bool {
        self.run(&["cat-file", "-e", &format!("{}^{{commit}}", sha)])
            .await
            .is_ok()
    }

    /// Files changed between `base..HEAD` plus the current worktree diff,
    /// deduplicated.
    pub async fn changed_files_since(&self, base: &str) -> Result<Vec<String>, DomainError> {
        let committed = self
            .run(&["diff", "--name-only", &format!("{}..HEAD", base)])
            .await?;
        let worktree = self.run(&["diff", "--name-only"]).await?;
        let mut files: Vec<String> = Vec::new();
        for line in committed.lines().chain(worktree.lines()) {
            let line = line.trim();
            if !line.is_empty() && !files.iter().any(|f| f == line) {
                files.push(line.to_string());
            }
        }
        Ok(files)
    }

    /// Files touched within the last `days` days.
    pub async fn recent_files(&self, days: u32) -> Result<Vec<String>, DomainError> {
        let since = format!("--since={} days ago", days);
        let output = self
            .run(&["log", &since, "--name-only", "--pretty=format:"])
            .await?;
        let mut files: Vec<String> = Vec::new();
        for line in output.lines() {
            let line = line.trim();
            if !line.is_empty() && !files.iter().any(|f| f == line) {
                files.push(line.to_string());
            }
        }
        Ok(files)
    }

    /// Pickaxe: SHAs of commits whose diffs add or remove `needle`.
    pub async fn pickaxe(&self, needle: &str, limit: usize) -> Result<Vec<String>, DomainError> {
        let max = format!("--max-count={}", limit);
        let pickaxe = format!("-S{}", needle);
        let output = self
            .run(&["log", &pickaxe, "--format=%H", &max])
            .await?;
        Ok(output.lines().map(|l| l.trim().to_string()).collect())
    }

    /// Most recent SHA touching `line` of `file` according to blame.
    pub async fn blame_line(&self, file: &str, line: u32) -> Result<Option<String>, DomainError> {
        let range = format!("-L{},{}", line, line);
        let output = match self
            .run(&["blame", &range, "--porcelain", "--", file])
            .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!("blame failed for {}:{}: {}", file, line, e);
                return Ok(None);
            }
        };
        Ok(output
            .lines()
            .next()
            .and_then(|l| l.split_whitespace().next())
            .map(|sha| sha.to_string()))
    }

    /// SHAs of commits whose message matches `term` (case-insensitive).
    pub async fn grep_log(&self, term: &str, limit: usize) -> Result<Vec<String>, DomainError> {
        let grep = format!("--grep={}", term);
        let max = format!("--max-count={}", limit);
        let output = self
            .run(&["log", &grep, "-i", "--format=%H", &max])
            .await?;
        Ok(output.lines().map(|l| l.trim().to_string()).collect())
    }

    /// SHAs of commits by `author` (case-insensitive substring).
    pub async fn log_by_author(
        &self,
        author: &str,
        limit: usize,
    ) -> Result<Vec<String>, DomainError> {
        let author_arg = format!("--author={}", author);
        let max = format!("--max-count={}", limit);
        let output = self
            .run(&["log", &author_arg, "-i", "--format=%H", &max])
            .await?;
        Ok(output.lines().map(|l| l.trim().to_string()).collect())
    }

    /// Full patch of one commit, split per touched file.
    pub async fn commit_patch(&self, sha: &str) -> Result<HashMap<String, String>, DomainError> {
        let output = self.run(&["show", sha, "--format=", "--patch"]).await?;
        Ok(split_patch_by_file(&output))
    }
}

/// Splits `git show --patch` output on `diff --git` boundaries into a
/// `file path -> hunk text` map. Binary files map to `[binary file]`.
pub fn split_patch_by_file(patch: &str) -> HashMap<String, String> {
    let mut files: HashMap<String, String> = HashMap::new();
    let mut current_file: Option<String> = None;
    let mut current_body = String::new();

    let flush = |file: &mut Option<String>, body: &mut String, files: &mut HashMap<String, String>| {
        if let Some(path) = file.take() {
            let text = if body.contains("Binary files ") || body.contains("GIT binary patch") {
                "[binary file]".to_string()
            } else {
                std::mem::take(body)
            };
            files.insert(path, text);
        }
        body.clear();
    };

    for line in patch.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            flush(&mut current_file, &mut current_body, &mut files);
            // `diff --git a/path b/path` — take the b/ side.
            current_file = rest
                .split(" b/")
                .nth(1)
                .map(|p| p.trim().to_string())
                .or_else(|| rest.split_whitespace().last().map(|p| {
                    p.trim_start_matches("b/").to_string()
                }));
            continue;
        }
        if current_file.is_some() {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    flush(&mut current_file, &mut current_body, &mut files);
    files
}
