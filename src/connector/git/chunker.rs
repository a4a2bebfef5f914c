use std::collections::HashMap;

use regex::Regex;

use crate::connector::config::GitConfig;
use crate::domain::{DecisionClass, DomainError, GitChunk, GitChunkType, RawCommit};

/// Turns raw commits into embeddable history chunks: exactly one
/// `commit_summary`, optionally one `file_diff` per touched file, and
/// optionally one `merge_group` for multi-parent commits.
pub struct CommitChunker {
    config: GitConfig,
    low_quality: Regex,
    conventional: Regex,
    merge_branch: Regex,
}

impl CommitChunker {
    pub fn new(config: GitConfig) -> Result<Self, DomainError> {
        Ok(Self {
            config,
            low_quality: Regex::new(r"(?i)^(fix|wip|update|tmp|test|cleanup|minor|typo|\.)\b")
                .map_err(|e| DomainError::internal(format!("low-quality regex: {}", e)))?,
            conventional: Regex::new(r"^(\w+)(?:\(([^)]*)\))?!?:\s*(.+)$")
                .map_err(|e| DomainError::internal(format!("conventional regex: {}", e)))?,
            merge_branch: Regex::new(r"Merge pull request #\d+ from (\S+)")
                .map_err(|e| DomainError::internal(format!("merge-branch regex: {}", e)))?,
        })
    }

    /// Chunks one commit. `patch` maps touched files to their hunk text
    /// when file-chunk emission is enabled. The summary chunk is always
    /// first in the returned batch.
    pub fn chunk_commit(
        &self,
        commit: &RawCommit,
        patch: Option<&HashMap<String, String>>,
    ) -> Vec<GitChunk> {
        let (commit_type, scope) = self.parse_conventional(&commit.subject);
        let branch = self.extract_branch(commit);
        let decision_class = classify_decision(commit);

        let mut chunks = Vec::new();

        if commit.is_merge() {
            if self.config.include_merge_groups {
                chunks.push(GitChunk::new(
                    commit,
                    GitChunkType::MergeGroup,
                    String::new(),
                    commit_type.clone(),
                    scope.clone(),
                    branch.clone(),
                    self.merge_group_text(commit),
                    decision_class,
                ));
            }
            return chunks;
        }

        let text = if self.config.enrich_low_quality_messages
            && self.is_low_quality(&commit.subject)
        {
            self.enriched_summary_text(commit)
        } else {
            self.summary_text(commit)
        };
        chunks.push(GitChunk::new(
            commit,
            GitChunkType::CommitSummary,
            String::new(),
            commit_type.clone(),
            scope.clone(),
            branch.clone(),
            text,
            decision_class,
        ));

        if self.config.include_file_chunks {
            for file in &commit.files {
                let hunk = if file.binary {
                    "[binary file]".to_string()
                } else {
                    let raw = patch
                        .and_then(|p| p.get(&file.path))
                        .map(|s| s.as_str())
                        .unwrap_or("");
                    truncate_hunk(raw, self.config.max_diff_lines_per_file)
                };
                let text = format!(
                    "{}: {} (+{} -{})\n{}",
                    commit.subject, file.path, file.additions, file.deletions, hunk
                );
                chunks.push(GitChunk::new(
                    commit,
                    GitChunkType::FileDiff,
                    file.path.clone(),
                    commit_type.clone(),
                    scope.clone(),
                    branch.clone(),
                    text,
                    decision_class,
                ));
            }
        }

        chunks
    }

    /// `type(scope): subject` → `(type, scope)`; empty strings otherwise.
    pub fn parse_conventional(&self, subject: &str) -> (String, String) {
        match self.conventional.captures(subject) {
            Some(caps) => (
                caps[1].to_lowercase(),
                caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        }
    }

    /// A subject is low quality when it is shorter than the configured
    /// threshold or leads with a throwaway word.
    pub fn is_low_quality(&self, subject: &str) -> bool {
        subject.trim().len() < self.config.low_quality_threshold
            || self.low_quality.is_match(subject.trim())
    }

    /// Branch from the refs decoration, else from a merge-PR subject.
    pub fn extract_branch(&self, commit: &RawCommit) -> String {
        for part in commit.refs.split(',') {
            let part = part.trim();
            if let Some(branch) = part.strip_prefix("HEAD -> ") {
                return branch.to_string();
            }
        }
        if let Some(caps) = self.merge_branch.captures(&commit.subject) {
            return caps[1].to_string();
        }
        String::new()
    }

    fn summary_text(&self, commit: &RawCommit) -> String {
        let mut text = format!(
            "{} <{}> on {}: {}",
            commit.author, commit.email, commit.date, commit.subject
        );
        let dirs = top_directories(commit, 3);
        if !dirs.is_empty() {
            text.push_str(&format!("\nDirectories: {}", dirs.join(", ")));
        }
        text.push_str(&format!(
            "\n{} files changed, +{} -{}",
            commit.files.len(),
            commit.additions(),
            commit.deletions()
        ));
        if !commit.body.is_empty() {
            text.push('\n');
            text.push_str(&commit.body);
        }
        text
    }

    /// Structured rebuild for low-quality subjects so vector search has
    /// more to grip on than "fix".
    fn enriched_summary_text(&self, commit: &RawCommit) -> String {
        let mut text = format!(
            "Commit by {} on {}: {}",
            commit.author, commit.date, commit.subject
        );
        if !commit.files.is_empty() {
            text.push_str("\nFiles changed:");
            for file in &commit.files {
                text.push_str(&format!(
                    "\n- {} (+{} -{})",
                    file.path, file.additions, file.deletions
                ));
            }
            if let Some(primary) = primary_file(commit) {
                text.push_str(&format!("\nPrimary file: {}", primary));
            }
            let scope = change_scope(commit);
            if !scope.is_empty() {
                text.push_str(&format!("\nChange scope: {}", scope));
            }
        }
        if !commit.body.is_empty() {
            text.push('\n');
            text.push_str(&commit.body);
        }
        text
    }

    fn merge_group_text(&self, commit: &RawCommit) -> String {
        format!(
            "Merge by {} on {}: {} ({} parents)",
            commit.author,
            commit.date,
            commit.subject,
            commit.parents.len()
        )
    }
}

/// The file with the largest total change.
fn primary_file(commit: &RawCommit) -> Option<String> {
    commit
        .files
        .iter()
        .max_by_key(|f| f.additions + f.deletions)
        .map(|f| f.path.clone())
}

/// Change scope from the primary file: `<pkg>/<sub>` when the path leads
/// with `src/` (directory segments only), else the leading path component.
fn change_scope(commit: &RawCommit) -> String {
    let Some(primary) = primary_file(commit) else {
        return String::new();
    };
    let parts: Vec<&str> = primary.split('/').collect();
    if parts.first() == Some(&"src") {
        // parts[1..] minus the trailing filename.
        match parts.len() {
            0..=2 => "src".to_string(),
            3 => parts[1].to_string(),
            _ => format!("{}/{}", parts[1], parts[2]),
        }
    } else if parts.len() > 1 {
        parts[0].to_string()
    } else {
        String::new()
    }
}

/// Most-touched parent directories, counted per file, top `n`.
fn top_directories(commit: &RawCommit, n: usize) -> Vec<String> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for file in &commit.files {
        let dir = match file.path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => ".".to_string(),
        };
        *counts.entry(dir).or_insert(0) += 1;
    }
    let mut dirs: Vec<(String, u32)> = counts.into_iter().collect();
    dirs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    dirs.into_iter().take(n).map(|(dir, _)| dir).collect()
}

/// Hunk truncation: first `max_lines` lines plus a count of what was cut.
fn truncate_hunk(hunk: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = hunk.lines().collect();
    if lines.len() <= max_lines {
        return hunk.trim_end().to_string();
    }
    let kept = lines[..max_lines].join("\n");
    format!("{}\n… truncated ({} more lines)", kept, lines.len() - max_lines)
}

/// Keyword heuristic over subject and body.
fn classify_decision(commit: &RawCommit) -> DecisionClass {
    const DECISION_MARKERS: &[&str] = &[
        "refactor",
        "migrate",
        "introduce",
        "redesign",
        "switch to",
        "adopt",
        "deprecate",
        "breaking",
        "rewrite",
    ];
    const ROUTINE_MARKERS: &[&str] = &[
        "chore", "bump", "typo", "lint", "format", "whitespace", "lockfile",
    ];
    let haystack = format!("{} {}", commit.subject, commit.body).to_lowercase();
    if DECISION_MARKERS.iter().any(|m| haystack.contains(m)) {
        return DecisionClass::Decision;
    }
    if ROUTINE_MARKERS.iter().any(|m| haystack.contains(m)) {
        return DecisionClass::Routine;
    }
    DecisionClass::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FileChange;

    fn chunker() -> CommitChunker {
        CommitChunker::new(GitConfig::default()).unwrap()
    }

    fn commit(subject: &str, files: &[(&str, u32, u32)]) -> RawCommit {
        RawCommit {
            sha: "abc123".to_string(),
            author: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            date: "2024-03-01T12:00:00+00:00".to_string(),
            subject: subject.to_string(),
            body: String::new(),
            parents: vec!["p1".to_string()],
            refs: String::new(),
            files: files
                .iter()
                .map(|(path, a, d)| FileChange {
                    path: path.to_string(),
                    additions: *a,
                    deletions: *d,
                    binary: false,
                })
                .collect(),
        }
    }

    #[test]
    fn test_summary_first_then_file_diffs() {
        let c = commit("feat(auth): add login", &[("src/auth/login.ts", 10, 2)]);
        let chunks = chunker().chunk_commit(&c, None);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_type(), GitChunkType::CommitSummary);
        assert_eq!(chunks[1].chunk_type(), GitChunkType::FileDiff);
        assert_eq!(chunks[1].file_path(), "src/auth/login.ts");
        assert_eq!(chunks[0].file_path(), "");
    }

    #[test]
    fn test_conventional_parse() {
        let chunker = chunker();
        assert_eq!(
            chunker.parse_conventional("feat(auth): add login"),
            ("feat".to_string(), "auth".to_string())
        );
        assert_eq!(
            chunker.parse_conventional("fix: null check"),
            ("fix".to_string(), String::new())
        );
        assert_eq!(
            chunker.parse_conventional("Update the readme"),
            (String::new(), String::new())
        );
    }

    #[test]
    fn test_low_quality_detection() {
        let chunker = chunker();
        assert!(chunker.is_low_quality("wip"));
        assert!(chunker.is_low_quality("fix stuff here please"));
        assert!(chunker.is_low_quality("."));
        assert!(!chunker.is_low_quality("feat(auth): add login flow with sessions"));
    }

    #[test]
    fn test_low_quality_subject_gets_enriched_text() {
        let c = commit("wip", &[("src/billing/invoice.ts", 20, 5)]);
        let chunks = chunker().chunk_commit(&c, None);
        let summary = &chunks[0];
        assert!(summary.text().contains("Files changed:"));
        assert!(summary.text().contains("Primary file: src/billing/invoice.ts"));
        assert!(summary.text().contains("Change scope: billing"));
    }

    #[test]
    fn test_branch_from_refs_decoration() {
        let chunker = chunker();
        let mut c = commit("feat: x", &[]);
        c.refs = "HEAD -> main, origin/main".to_string();
        assert_eq!(chunker.extract_branch(&c), "main");
    }

    #[test]
    fn test_branch_from_merge_subject() {
        let chunker = chunker();
        let c = commit("Merge pull request #42 from alice/feature-login", &[]);
        assert_eq!(chunker.extract_branch(&c), "alice/feature-login");
    }

    #[test]
    fn test_merge_commit_without_groups_yields_nothing() {
        let mut c = commit("Merge branch 'dev'", &[("src/a.ts", 1, 1)]);
        c.parents = vec!["p1".to_string(), "p2".to_string()];
        let chunks = chunker().chunk_commit(&c, None);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_merge_group_when_enabled() {
        let mut config = GitConfig::default();
        config.include_merge_groups = true;
        let chunker = CommitChunker::new(config).unwrap();
        let mut c = commit("Merge branch 'dev'", &[("src/a.ts", 1, 1)]);
        c.parents = vec!["p1".to_string(), "p2".to_string()];
        let chunks = chunker.chunk_commit(&c, None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type(), GitChunkType::MergeGroup);
    }

    #[test]
    fn test_hunk_truncation() {
        let hunk = (0..100).map(|i| format!("+line {}", i)).collect::<Vec<_>>().join("\n");
        let truncated = truncate_hunk(&hunk, 80);
        assert!(truncated.ends_with("… truncated (20 more lines)"));
    }

    #[test]
    fn test_binary_file_diff_text() {
        let mut c = commit("feat: add logo", &[("assets/logo.png", 0, 0)]);
        c.files[0].binary = true;
        let chunks = chunker().chunk_commit(&c, None);
        let diff = chunks
            .iter()
            .find(|ch| ch.chunk_type() == GitChunkType::FileDiff)
            .unwrap();
        assert!(diff.text().contains("[binary file]"));
    }

    #[test]
    fn test_decision_classification() {
        let decision = commit("refactor: switch to new parser", &[]);
        assert_eq!(classify_decision(&decision), DecisionClass::Decision);

        let routine = commit("chore: bump deps", &[]);
        assert_eq!(classify_decision(&routine), DecisionClass::Routine);

        let unknown = commit("feat: add login", &[]);
        assert_eq!(classify_decision(&unknown), DecisionClass::Unknown);
    }
}
