use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A commit as streamed out of the extractor, before chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommit {
    pub sha: String,
    pub author: String,
    pub email: String,
    /// ISO-8601 author date (`%aI`).
    pub date: String,
    pub subject: String,
    pub body: String,
    pub parents: Vec<String>,
    pub refs: String,
    pub files: Vec<FileChange>,
}

impl RawCommit {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn additions(&self) -> u32 {
        self.files.iter().map(|f| f.additions).sum()
    }

    pub fn deletions(&self) -> u32 {
        self.files.iter().map(|f| f.deletions).sum()
    }
}

/// One numstat row: additions/deletions per touched file.
/// Binary files carry `-\t-` in numstat and count as 0/0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub additions: u32,
    pub deletions: u32,
    pub binary: bool,
}

/// Deterministic history-chunk identifier: 16 hex chars of SHA-256 over
/// `<sha>:<chunk kind>:<file path>` (file path empty for summaries).
pub fn git_chunk_id(sha: &str, chunk_type: GitChunkType, file_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sha.as_bytes());
    hasher.update(b":");
    hasher.update(chunk_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(file_path.as_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitChunk {
    id: String,
    sha: String,
    author: String,
    email: String,
    date: String,
    subject: String,
    body: String,
    parents: Vec<String>,
    refs: String,
    chunk_type: GitChunkType,
    /// Conventional-commit type (`feat`, `fix`, ...), empty if non-conventional.
    commit_type: String,
    scope: String,
    /// Empty for `CommitSummary` and `MergeGroup` chunks.
    file_path: String,
    files_changed: u32,
    additions: u32,
    deletions: u32,
    branch: String,
    /// The embeddable text body.
    text: String,
    decision_class: DecisionClass,
}

impl GitChunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        commit: &RawCommit,
        chunk_type: GitChunkType,
        file_path: String,
        commit_type: String,
        scope: String,
        branch: String,
        text: String,
        decision_class: DecisionClass,
    ) -> Self {
        Self {
            id: git_chunk_id(&commit.sha, chunk_type, &file_path),
            sha: commit.sha.clone(),
            author: commit.author.clone(),
            email: commit.email.clone(),
            date: commit.date.clone(),
            subject: commit.subject.clone(),
            body: commit.body.clone(),
            parents: commit.parents.clone(),
            refs: commit.refs.clone(),
            chunk_type,
            commit_type,
            scope,
            file_path,
            files_changed: commit.files.len() as u32,
            additions: commit.additions(),
            deletions: commit.deletions(),
            branch,
            text,
            decision_class,
        }
    }

    /// Reconstitutes from persisted data (used by the store adapter).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: String,
        sha: String,
        author: String,
        email: String,
        date: String,
        subject: String,
        body: String,
        parents: Vec<String>,
        refs: String,
        chunk_type: GitChunkType,
        commit_type: String,
        scope: String,
        file_path: String,
        files_changed: u32,
        additions: u32,
        deletions: u32,
        branch: String,
        text: String,
        decision_class: DecisionClass,
    ) -> Self {
        Self {
            id,
            sha,
            author,
            email,
            date,
            subject,
            body,
            parents,
            refs,
            chunk_type,
            commit_type,
            scope,
            file_path,
            files_changed,
            additions,
            deletions,
            branch,
            text,
            decision_class,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sha(&self) -> &str {
        &self.sha
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn refs(&self) -> &str {
        &self.refs
    }

    pub fn chunk_type(&self) -> GitChunkType {
        self.chunk_type
    }

    pub fn commit_type(&self) -> &str {
        &self.commit_type
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn files_changed(&self) -> u32 {
        self.files_changed
    }

    pub fn additions(&self) -> u32 {
        self.additions
    }

    pub fn deletions(&self) -> u32 {
        self.deletions
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn decision_class(&self) -> DecisionClass {
        self.decision_class
    }

    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(8)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitChunkType {
    CommitSummary,
    FileDiff,
    MergeGroup,
}

impl GitChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitChunkType::CommitSummary => "commit_summary",
            GitChunkType::FileDiff => "file_diff",
            GitChunkType::MergeGroup => "merge_group",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "file_diff" => GitChunkType::FileDiff,
            "merge_group" => GitChunkType::MergeGroup,
            _ => GitChunkType::CommitSummary,
        }
    }
}

impl std::fmt::Display for GitChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a commit reads as a design decision, routine churn, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionClass {
    Decision,
    Routine,
    Unknown,
}

impl DecisionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionClass::Decision => "decision",
            DecisionClass::Routine => "routine",
            DecisionClass::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "decision" => DecisionClass::Decision,
            "routine" => DecisionClass::Routine,
            _ => DecisionClass::Unknown,
        }
    }

    /// Tie-break order for majority votes: decision > routine > unknown.
    pub fn rank(&self) -> u8 {
        match self {
            DecisionClass::Decision => 2,
            DecisionClass::Routine => 1,
            DecisionClass::Unknown => 0,
        }
    }
}
