//! AST-derived semantic chunking.
//!
//! Each language implements [`LanguageChunker`]; a [`ChunkerRegistry`]
//! dispatches by file extension. Files with no matching strategy are
//! silently skipped by callers.

mod python;
mod ruby;
mod rust_lang;
mod typescript;

pub use python::PythonChunker;
pub use ruby::RubyChunker;
pub use rust_lang::RustChunker;
pub use typescript::TypeScriptChunker;

use std::path::Path;

use regex::Regex;

use crate::domain::{ChunkType, CodeChunk, DomainError, FrameworkRole, Language};

/// Files under this many lines become a single whole-file chunk.
pub const SMALL_FILE_LINES: usize = 50;

/// Import lines carried into each chunk body.
const MAX_IMPORT_LINES: usize = 10;

/// Per-language chunking strategy.
///
/// `init` performs one-time parser setup; `chunk_file` converts one file
/// into semantic chunks. Implementations walk top-level declarations once.
pub trait LanguageChunker: Send {
    fn language(&self) -> Language;

    fn extensions(&self) -> &'static [&'static str];

    /// Regex sources matched against repo-relative paths to spot test files.
    fn test_patterns(&self) -> &'static [&'static str];

    fn init(&mut self) -> Result<(), DomainError>;

    fn chunk_file(
        &mut self,
        absolute_path: &Path,
        content: &str,
        repo_root: &Path,
        max_tokens: usize,
    ) -> Result<Vec<CodeChunk>, DomainError>;
}

/// Selects a [`LanguageChunker`] by file extension.
pub struct ChunkerRegistry {
    chunkers: Vec<Box<dyn LanguageChunker>>,
    test_regexes: Vec<Regex>,
}

impl ChunkerRegistry {
    /// Registers every shipped language strategy and runs its `init`.
    pub fn with_default_languages() -> Result<Self, DomainError> {
        let chunkers: Vec<Box<dyn LanguageChunker>> = vec![
            Box::new(TypeScriptChunker::new()),
            Box::new(RustChunker::new()),
            Box::new(PythonChunker::new()),
            Box::new(RubyChunker::new()),
        ];
        Self::with_chunkers(chunkers)
    }

    pub fn with_chunkers(
        mut chunkers: Vec<Box<dyn LanguageChunker>>,
    ) -> Result<Self, DomainError> {
        let mut test_regexes = Vec::new();
        for chunker in &mut chunkers {
            chunker.init()?;
            for pattern in chunker.test_patterns() {
                let regex = Regex::new(pattern).map_err(|e| {
                    DomainError::internal(format!("Bad test pattern {}: {}", pattern, e))
                })?;
                test_regexes.push(regex);
            }
        }
        Ok(Self {
            chunkers,
            test_regexes,
        })
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.index_for(path).is_some()
    }

    pub fn is_test_file(&self, relative_path: &str) -> bool {
        self.test_regexes.iter().any(|r| r.is_match(relative_path))
    }

    /// Chunks one file. `Ok(None)` when no strategy matches the extension.
    pub fn chunk_file(
        &mut self,
        absolute_path: &Path,
        content: &str,
        repo_root: &Path,
        max_tokens: usize,
    ) -> Result<Option<Vec<CodeChunk>>, DomainError> {
        let Some(index) = self.index_for(absolute_path) else {
            return Ok(None);
        };
        let chunks =
            self.chunkers[index].chunk_file(absolute_path, content, repo_root, max_tokens)?;
        Ok(Some(chunks))
    }

    fn index_for(&self, path: &Path) -> Option<usize> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.chunkers
            .iter()
            .position(|c| c.extensions().contains(&ext.as_str()))
    }
}

// ── Shared policies ──────────────────────────────────────────────────────

/// Repo-relative path with forward slashes, for ids and chunk headers.
pub fn relative_path(absolute_path: &Path, repo_root: &Path) -> String {
    absolute_path
        .strip_prefix(repo_root)
        .unwrap_or(absolute_path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Name of the nearest ancestor manifest (`package.json` or `Cargo.toml`)
/// between the file and the repo root, or `"root"`.
pub fn nearest_package_name(absolute_path: &Path, repo_root: &Path) -> String {
    let mut dir = absolute_path.parent();
    while let Some(current) = dir {
        let package_json = current.join("package.json");
        if let Ok(raw) = std::fs::read_to_string(&package_json) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
                if let Some(name) = value.get("name").and_then(|n| n.as_str()) {
                    return name.to_string();
                }
            }
        }
        let cargo_toml = current.join("Cargo.toml");
        if let Ok(raw) = std::fs::read_to_string(&cargo_toml) {
            for line in raw.lines() {
                let line = line.trim();
                if let Some(rest) = line.strip_prefix("name") {
                    let rest = rest.trim_start();
                    if let Some(rest) = rest.strip_prefix('=') {
                        let name = rest.trim().trim_matches('"');
                        if !name.is_empty() {
                            return name.to_string();
                        }
                    }
                }
            }
        }
        if current == repo_root {
            break;
        }
        dir = current.parent();
    }
    "root".to_string()
}

/// Lines that look like imports, capped at [`MAX_IMPORT_LINES`].
pub fn import_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with("import ")
                || trimmed.starts_with("import{")
                || trimmed.starts_with("export * from")
                || trimmed.starts_with("use ")
                || trimmed.starts_with("require ")
                || trimmed.starts_with("require(")
                || trimmed.starts_with("from ")
                || (trimmed.starts_with("const ") && trimmed.contains("= require("))
        })
        .take(MAX_IMPORT_LINES)
        .collect()
}

/// Assembles the chunk body: `// file:` header, import lines, blank line,
/// then the extracted source.
pub fn build_chunk_content(relative_path: &str, file_content: &str, snippet: &str) -> String {
    let mut body = format!("// file: {}\n", relative_path);
    for line in import_lines(file_content) {
        body.push_str(line);
        body.push('\n');
    }
    body.push('\n');
    body.push_str(snippet);
    body
}

/// Framework role for `page|layout|middleware|route` basenames under an
/// `app/` or `api/` ancestor.
pub fn framework_role_for(relative_path: &str) -> Option<FrameworkRole> {
    let path = Path::new(relative_path);
    let stem = path.file_stem()?.to_str()?;
    let under_app_or_api = path
        .parent()
        .map(|p| {
            p.components().any(|c| {
                matches!(c.as_os_str().to_str(), Some("app") | Some("api"))
            })
        })
        .unwrap_or(false);
    if !under_app_or_api {
        return None;
    }
    match stem {
        "page" => Some(FrameworkRole::Page),
        "layout" => Some(FrameworkRole::Layout),
        "middleware" => Some(FrameworkRole::Middleware),
        "route" => Some(FrameworkRole::ApiRoute),
        _ => None,
    }
}

/// The small-file rule: one chunk spanning the whole file, typed `Other`
/// unless a framework role applies.
pub fn whole_file_chunk(
    absolute_path: &Path,
    content: &str,
    repo_root: &Path,
    max_tokens: usize,
    language: Language,
    role: Option<FrameworkRole>,
) -> CodeChunk {
    let rel = relative_path(absolute_path, repo_root);
    let line_count = content.lines().count().max(1) as u32;
    let name = Path::new(&rel)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    let chunk_type = match role {
        Some(FrameworkRole::ApiRoute) => ChunkType::Route,
        Some(FrameworkRole::Config) => ChunkType::Config,
        Some(_) => ChunkType::Component,
        None => ChunkType::Other,
    };
    let mut chunk = CodeChunk::new(
        rel.clone(),
        nearest_package_name(absolute_path, repo_root),
        name,
        chunk_type,
        1,
        line_count,
        build_chunk_content(&rel, content, content),
        language,
    )
    .with_token_budget(max_tokens);
    if let Some(role) = role {
        chunk = chunk.with_framework_role(role);
    }
    chunk
}

/// Names recognized as HTTP-method exports in API route files.
pub fn is_http_method(name: &str) -> bool {
    matches!(name, "GET" | "POST" | "PUT" | "PATCH" | "DELETE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_role_requires_app_or_api_ancestor() {
        assert_eq!(
            framework_role_for("app/dashboard/page.tsx"),
            Some(FrameworkRole::Page)
        );
        assert_eq!(
            framework_role_for("app/api/items/route.ts"),
            Some(FrameworkRole::ApiRoute)
        );
        assert_eq!(
            framework_role_for("app/middleware.ts"),
            Some(FrameworkRole::Middleware)
        );
        assert_eq!(framework_role_for("src/page.tsx"), None);
        assert_eq!(framework_role_for("page.tsx"), None);
    }

    #[test]
    fn test_import_lines_capped_at_ten() {
        let content = (0..15)
            .map(|i| format!("import {{ x{} }} from './x{}';", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(import_lines(&content).len(), 10);
    }

    #[test]
    fn test_chunk_content_shape() {
        let file = "import { a } from './a';\n\nexport const b = 1;\n";
        let body = build_chunk_content("src/b.ts", file, "export const b = 1;");
        let mut lines = body.lines();
        assert_eq!(lines.next(), Some("// file: src/b.ts"));
        assert_eq!(lines.next(), Some("import { a } from './a';"));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.next(), Some("export const b = 1;"));
    }

    #[test]
    fn test_http_method_names() {
        for m in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
            assert!(is_http_method(m));
        }
        assert!(!is_http_method("OPTIONS"));
        assert!(!is_http_method("get"));
    }
}
