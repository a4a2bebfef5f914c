use std::path::{Path, PathBuf};
use std::process::Stdio;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::connector::config::GitConfig;
use crate::domain::{DomainError, FileChange, RawCommit};

/// First token of every per-commit header line.
pub const COMMIT_SENTINEL: &str = "@@COMMIT@@";

/// Basenames whose exclusive presence marks a lock-file-only commit.
const LOCK_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "go.sum",
    "Cargo.lock",
    "composer.lock",
    "Gemfile.lock",
    "poetry.lock",
];

/// Exit code when the child dies on SIGPIPE after we close its output.
const EXIT_SIGPIPE: i32 = 141;

/// Filters applied while streaming commits out of `git log`.
pub struct ExtractOptions {
    /// Lowercased substrings; a matching author skips the commit.
    pub skip_bot_authors: Vec<String>,
    /// Compiled once; a matching subject skips the commit.
    pub skip_message_patterns: Vec<Regex>,
    /// Keep multi-parent commits (for merge-group emission downstream).
    pub keep_merges: bool,
    /// Stop the child after this many kept commits; 0 = unbounded.
    pub max_commits: usize,
    /// Optional revision range, e.g. `abc123..HEAD`.
    pub range: Option<String>,
    /// Optional `--since` cutoff, e.g. `30 days ago`.
    pub since: Option<String>,
}

impl ExtractOptions {
    pub fn from_git_config(git: &GitConfig) -> Result<Self, DomainError> {
        let skip_message_patterns = git
            .skip_message_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p)).map_err(|e| {
                    DomainError::ConfigParse(format!("Bad skip pattern {}: {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            skip_bot_authors: git
                .skip_bot_authors
                .iter()
                .map(|a| a.to_lowercase())
                .collect(),
            skip_message_patterns,
            keep_merges: git.include_merge_groups,
            max_commits: git.max_commits,
            range: None,
            since: None,
        })
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

/// Result of a streaming extraction run.
pub struct ExtractOutcome {
    pub commits: Vec<RawCommit>,
    pub skipped: u64,
}

/// Streams `git log` from a child process into [`RawCommit`] records.
pub struct CommitExtractor {
    repo_root: PathBuf,
    options: ExtractOptions,
}

impl CommitExtractor {
    pub fn new(repo_root: &Path, options: ExtractOptions) -> Result<Self, DomainError> {
        if !repo_root.join(".git").exists() {
            return Err(DomainError::NotAGitRepo(
                repo_root.display().to_string(),
            ));
        }
        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            options,
        })
    }

    /// Runs the child and drains its output line by line. The child is
    /// killed once `max_commits` kept commits have been parsed; SIGPIPE
    /// exits are success.
    pub async fn extract(&self) -> Result<ExtractOutcome, DomainError> {
        // Body placed last so its newlines become continuation lines; every
        // fixed field stays on the header line.
        let format = format!(
            "{}%x00%H%x00%an%x00%ae%x00%aI%x00%s%x00%P%x00%D%x00%b",
            COMMIT_SENTINEL
        );
        let mut args: Vec<String> = vec![
            "log".to_string(),
            format!("--pretty=format:{}", format),
            "--numstat".to_string(),
        ];
        if let Some(since) = &self.options.since {
            args.push(format!("--since={}", since));
        }
        if let Some(range) = &self.options.range {
            args.push(range.clone());
        }

        let mut child = Command::new("git")
            .args(&args)
            .current_dir(&self.repo_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DomainError::storage(format!("Failed to spawn git log: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DomainError::internal("git log stdout not captured"))?;
        let mut reader = BufReader::new(stdout);

        let mut parser = CommitParser::new();
        let mut commits: Vec<RawCommit> = Vec::new();
        let mut skipped: u64 = 0;
        let mut truncated = false;
        let mut buf: Vec<u8> = Vec::new();

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| DomainError::storage(format!("Failed to read git log: {}", e)))?;
            if read == 0 {
                break;
            }
            // Lossy decode: invalid bytes must not abort the stream.
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if let Some(commit) = parser.feed(line) {
                if self.keep_or_skip(commit, &mut commits, &mut skipped) {
                    truncated = true;
                    break;
                }
            }
        }

        if !truncated {
            if let Some(commit) = parser.finish() {
                self.keep_or_skip(commit, &mut commits, &mut skipped);
            }
        } else {
            // Cap reached: terminate the child and drain what remains so the
            // pipe closes cleanly.
            let _ = child.start_kill();
            let mut rest = Vec::new();
            let _ = tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut rest).await;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to wait for git log: {}", e)))?;
        let code = status.code();
        let exited_cleanly =
            status.success() || code == Some(EXIT_SIGPIPE) || (truncated && code.is_none());
        if !exited_cleanly {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = tokio::io::AsyncReadExt::read_to_string(&mut pipe, &mut stderr).await;
            }
            return Err(DomainError::storage(format!(
                "git log failed ({:?}): {}",
                code,
                stderr.trim()
            )));
        }

        debug!(
            "Extracted {} commits ({} skipped) from {}",
            commits.len(),
            skipped,
            self.repo_root.display()
        );
        Ok(ExtractOutcome { commits, skipped })
    }

    /// Applies skip rules; returns `true` once the cap is reached.
    fn keep_or_skip(
        &self,
        commit: RawCommit,
        commits: &mut Vec<RawCommit>,
        skipped: &mut u64,
    ) -> bool {
        if should_skip(&commit, &self.options) {
            *skipped += 1;
            return false;
        }
        commits.push(commit);
        self.options.max_commits > 0 && commits.len() >= self.options.max_commits
    }
}

/// Skip rules: bot author, skip-pattern subject, merge commit (unless
/// merges are kept), or a lock-file-only change set.
pub fn should_skip(commit: &RawCommit, options: &ExtractOptions) -> bool {
    let author = format!("{} {}", commit.author, commit.email).to_lowercase();
    if options
        .skip_bot_authors
        .iter()
        .any(|bot| author.contains(bot))
    {
        return true;
    }
    if options
        .skip_message_patterns
        .iter()
        .any(|p| p.is_match(&commit.subject))
    {
        return true;
    }
    if commit.is_merge() && !options.keep_merges {
        return true;
    }
    if !commit.files.is_empty()
        && commit.files.iter().all(|f| {
            Path::new(&f.path)
                .file_name()
                .and_then(|n| n.to_str())
                .map(|name| LOCK_FILES.contains(&name))
                .unwrap_or(false)
        })
    {
        return true;
    }
    false
}

/// Line-by-line commit parser with one pending record of look-ahead.
///
/// A sentinel header opens a commit; numstat rows attach file changes;
/// any other non-blank line continues the body.
pub struct CommitParser {
    pending: Option<RawCommit>,
    numstat: Regex,
}

impl CommitParser {
    pub fn new() -> Self {
        Self {
            pending: None,
            numstat: Regex::new(r"^(\d+|-)\t(\d+|-)\t(.+)$").expect("static numstat regex"),
        }
    }

    /// Feeds one line; returns the previous commit when a new header opens.
    pub fn feed(&mut self, line: &str) -> Option<RawCommit> {
        if let Some(rest) = line.strip_prefix(COMMIT_SENTINEL) {
            let completed = self.pending.take();
            match parse_header(rest) {
                Some(commit) => self.pending = Some(commit),
                None => warn!("Unreadable commit header, skipping block"),
            }
            return completed;
        }

        let Some(current) = self.pending.as_mut() else {
            return None;
        };

        if let Some(caps) = self.numstat.captures(line) {
            let additions = caps[1].parse::<u32>().ok();
            let deletions = caps[2].parse::<u32>().ok();
            let binary = additions.is_none() || deletions.is_none();
            current.files.push(FileChange {
                path: caps[3].to_string(),
                additions: additions.unwrap_or(0),
                deletions: deletions.unwrap_or(0),
                binary,
            });
            return None;
        }

        if !line.trim().is_empty() {
            if !current.body.is_empty() {
                current.body.push('\n');
            }
            current.body.push_str(line);
        }
        None
    }

    /// Flushes the final pending commit at end of stream.
    pub fn finish(self) -> Option<RawCommit> {
        self.pending
    }
}

impl Default for CommitParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Header layout after the sentinel:
/// `\0sha\0author\0email\0date\0subject\0parents\0refs\0body-first-line`.
fn parse_header(rest: &str) -> Option<RawCommit> {
    let rest = rest.strip_prefix('\0')?;
    let fields: Vec<&str> = rest.splitn(8, '\0').collect();
    if fields.len() < 7 {
        return None;
    }
    let parents: Vec<String> = fields[5]
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    Some(RawCommit {
        sha: fields[0].to_string(),
        author: fields[1].to_string(),
        email: fields[2].to_string(),
        date: fields[3].to_string(),
        subject: fields[4].to_string(),
        parents,
        refs: fields[6].to_string(),
        body: fields.get(7).map(|b| b.trim().to_string()).unwrap_or_default(),
        files: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(sha: &str, subject: &str, parents: &str) -> String {
        format!(
            "{}\0{}\0Alice\0alice@example.com\02024-03-01T12:00:00+00:00\0{}\0{}\0\0",
            COMMIT_SENTINEL, sha, subject, parents
        )
    }

    fn parse_all(lines: &[String]) -> Vec<RawCommit> {
        let mut parser = CommitParser::new();
        let mut commits = Vec::new();
        for line in lines {
            if let Some(commit) = parser.feed(line) {
                commits.push(commit);
            }
        }
        if let Some(commit) = parser.finish() {
            commits.push(commit);
        }
        commits
    }

    #[test]
    fn test_parses_header_numstat_and_body() {
        let lines = vec![
            header("abc123", "feat: add login", "p1"),
            "10\t2\tsrc/auth/login.ts".to_string(),
            "-\t-\tassets/logo.png".to_string(),
            "".to_string(),
            "Adds the login flow.".to_string(),
            "Second body line.".to_string(),
        ];
        let commits = parse_all(&lines);
        assert_eq!(commits.len(), 1);
        let commit = &commits[0];
        assert_eq!(commit.sha, "abc123");
        assert_eq!(commit.subject, "feat: add login");
        assert_eq!(commit.files.len(), 2);
        assert_eq!(commit.files[0].additions, 10);
        assert!(commit.files[1].binary);
        assert_eq!(commit.files[1].additions, 0);
        assert_eq!(commit.body, "Adds the login flow.\nSecond body line.");
    }

    #[test]
    fn test_new_header_flushes_previous_commit() {
        let lines = vec![
            header("abc123", "feat: one", "p1"),
            "1\t0\ta.ts".to_string(),
            header("def456", "fix: two", "p2"),
            "2\t1\tb.ts".to_string(),
        ];
        let commits = parse_all(&lines);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "abc123");
        assert_eq!(commits[1].sha, "def456");
        assert_eq!(commits[1].files[0].deletions, 1);
    }

    #[test]
    fn test_merge_commit_parents_parsed() {
        let lines = vec![header("abc123", "Merge branch 'dev'", "p1 p2")];
        let commits = parse_all(&lines);
        assert_eq!(commits[0].parents.len(), 2);
        assert!(commits[0].is_merge());
    }

    fn options() -> ExtractOptions {
        ExtractOptions {
            skip_bot_authors: vec!["dependabot".to_string(), "[bot]".to_string()],
            skip_message_patterns: vec![Regex::new("(?i)^release").unwrap()],
            keep_merges: false,
            max_commits: 0,
            range: None,
            since: None,
        }
    }

    fn commit_touching(paths: &[&str]) -> RawCommit {
        RawCommit {
            sha: "abc".to_string(),
            author: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            date: "2024-03-01T12:00:00+00:00".to_string(),
            subject: "feat: change".to_string(),
            body: String::new(),
            parents: vec!["p".to_string()],
            refs: String::new(),
            files: paths
                .iter()
                .map(|p| FileChange {
                    path: p.to_string(),
                    additions: 1,
                    deletions: 0,
                    binary: false,
                })
                .collect(),
        }
    }

    #[test]
    fn test_skip_bot_author_case_insensitive() {
        let mut commit = commit_touching(&["src/a.ts"]);
        commit.author = "Dependabot".to_string();
        assert!(should_skip(&commit, &options()));
    }

    #[test]
    fn test_skip_message_pattern() {
        let mut commit = commit_touching(&["src/a.ts"]);
        commit.subject = "Release v1.2.3".to_string();
        assert!(should_skip(&commit, &options()));
    }

    #[test]
    fn test_skip_merge_unless_kept() {
        let mut commit = commit_touching(&["src/a.ts"]);
        commit.parents = vec!["p1".to_string(), "p2".to_string()];
        assert!(should_skip(&commit, &options()));

        let mut opts = options();
        opts.keep_merges = true;
        assert!(!should_skip(&commit, &opts));
    }

    #[test]
    fn test_skip_lock_file_only_commits() {
        let commit = commit_touching(&["package-lock.json", "sub/yarn.lock"]);
        assert!(should_skip(&commit, &options()));

        let mixed = commit_touching(&["package-lock.json", "src/a.ts"]);
        assert!(!should_skip(&mixed, &options()));
    }
}
