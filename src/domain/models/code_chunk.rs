use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Language;

/// Marker appended when a chunk body is cut at the token budget.
pub const TRUNCATION_MARKER: &str = "…truncated";

/// Rough token estimate used for chunk budgets: one token per 4 characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Stable chunk identifier: 16 hex chars of SHA-256 over
/// `<repo-relative path>:<line_start>:<line_end>`.
///
/// The relative path (never the absolute one) goes into the hash so the id
/// is identical across machines and checkout locations.
pub fn stable_chunk_id(relative_path: &str, line_start: u32, line_end: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative_path.as_bytes());
    hasher.update(b":");
    hasher.update(line_start.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(line_end.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChunk {
    id: String,
    file_path: String,
    package: String,
    name: String,
    chunk_type: ChunkType,
    line_start: u32,
    line_end: u32,
    content: String,
    language: Language,
    exported: bool,
    framework_role: Option<FrameworkRole>,
}

impl CodeChunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_path: String,
        package: String,
        name: String,
        chunk_type: ChunkType,
        line_start: u32,
        line_end: u32,
        content: String,
        language: Language,
    ) -> Self {
        debug_assert!(line_start <= line_end);
        Self {
            id: stable_chunk_id(&file_path, line_start, line_end),
            file_path,
            package,
            name,
            chunk_type,
            line_start,
            line_end,
            content,
            language,
            exported: false,
            framework_role: None,
        }
    }

    /// Reconstitutes from persisted data (used by the store adapter).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: String,
        file_path: String,
        package: String,
        name: String,
        chunk_type: ChunkType,
        line_start: u32,
        line_end: u32,
        content: String,
        language: Language,
        exported: bool,
        framework_role: Option<FrameworkRole>,
    ) -> Self {
        Self {
            id,
            file_path,
            package,
            name,
            chunk_type,
            line_start,
            line_end,
            content,
            language,
            exported,
            framework_role,
        }
    }

    pub fn with_exported(mut self, exported: bool) -> Self {
        self.exported = exported;
        self
    }

    pub fn with_framework_role(mut self, role: FrameworkRole) -> Self {
        self.framework_role = Some(role);
        self
    }

    /// Enforces the token budget: bodies over `max_tokens` are cut at
    /// `max_tokens * 4` characters (on a char boundary) and marked.
    pub fn with_token_budget(mut self, max_tokens: usize) -> Self {
        if estimate_tokens(&self.content) > max_tokens {
            let budget = max_tokens * 4;
            let mut cut = budget.min(self.content.len());
            while cut > 0 && !self.content.is_char_boundary(cut) {
                cut -= 1;
            }
            self.content.truncate(cut);
            self.content.push('\n');
            self.content.push_str(TRUNCATION_MARKER);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }

    pub fn line_start(&self) -> u32 {
        self.line_start
    }

    pub fn line_end(&self) -> u32 {
        self.line_end
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn exported(&self) -> bool {
        self.exported
    }

    pub fn framework_role(&self) -> Option<FrameworkRole> {
        self.framework_role
    }

    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.line_start, self.line_end)
    }

    pub fn line_count(&self) -> u32 {
        self.line_end.saturating_sub(self.line_start) + 1
    }
}

/// The kind of symbol a chunk was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Function,
    Class,
    Component,
    Hook,
    Type,
    Interface,
    Route,
    Config,
    Other,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Function => "function",
            ChunkType::Class => "class",
            ChunkType::Component => "component",
            ChunkType::Hook => "hook",
            ChunkType::Type => "type",
            ChunkType::Interface => "interface",
            ChunkType::Route => "route",
            ChunkType::Config => "config",
            ChunkType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "function" => ChunkType::Function,
            "class" => ChunkType::Class,
            "component" => ChunkType::Component,
            "hook" => ChunkType::Hook,
            "type" => ChunkType::Type,
            "interface" => ChunkType::Interface,
            "route" => ChunkType::Route,
            "config" => ChunkType::Config,
            _ => ChunkType::Other,
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role a file plays in an app-router style framework layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkRole {
    Page,
    Layout,
    ApiRoute,
    Middleware,
    Config,
}

impl FrameworkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameworkRole::Page => "page",
            FrameworkRole::Layout => "layout",
            FrameworkRole::ApiRoute => "api_route",
            FrameworkRole::Middleware => "middleware",
            FrameworkRole::Config => "config",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "page" => Some(FrameworkRole::Page),
            "layout" => Some(FrameworkRole::Layout),
            "api_route" => Some(FrameworkRole::ApiRoute),
            "middleware" => Some(FrameworkRole::Middleware),
            "config" => Some(FrameworkRole::Config),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_chunk_id("src/auth/login.ts", 10, 42);
        let b = stable_chunk_id("src/auth/login.ts", 10, 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_stable_id_varies_with_range() {
        let a = stable_chunk_id("src/auth/login.ts", 10, 42);
        let b = stable_chunk_id("src/auth/login.ts", 10, 43);
        let c = stable_chunk_id("src/auth/other.ts", 10, 42);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_token_budget_truncates_with_marker() {
        let body = "x".repeat(4_000);
        let chunk = CodeChunk::new(
            "src/big.ts".to_string(),
            "root".to_string(),
            "big".to_string(),
            ChunkType::Function,
            1,
            100,
            body,
            Language::TypeScript,
        )
        .with_token_budget(100);

        assert!(chunk.content().ends_with(TRUNCATION_MARKER));
        assert!(chunk.content().len() <= 100 * 4 + TRUNCATION_MARKER.len() + 1);
    }

    #[test]
    fn test_token_budget_keeps_small_bodies() {
        let chunk = CodeChunk::new(
            "src/small.ts".to_string(),
            "root".to_string(),
            "small".to_string(),
            ChunkType::Other,
            1,
            5,
            "const x = 1;".to_string(),
            Language::TypeScript,
        )
        .with_token_budget(512);

        assert!(!chunk.content().contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_chunk_type_round_trip() {
        for t in [
            ChunkType::Function,
            ChunkType::Class,
            ChunkType::Component,
            ChunkType::Hook,
            ChunkType::Type,
            ChunkType::Interface,
            ChunkType::Route,
            ChunkType::Config,
            ChunkType::Other,
        ] {
            assert_eq!(ChunkType::parse(t.as_str()), t);
        }
    }
}
