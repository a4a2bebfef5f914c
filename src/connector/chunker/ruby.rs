use std::path::Path;

use tree_sitter::{Node, Parser};

use super::{
    build_chunk_content, nearest_package_name, relative_path, whole_file_chunk, LanguageChunker,
    SMALL_FILE_LINES,
};
use crate::domain::{ChunkType, CodeChunk, DomainError, Language};

/// Ruby strategy: `method`, `singleton_method`, `class` and `module`
/// declarations at the root level only.
pub struct RubyChunker {
    parser: Option<Parser>,
}

impl RubyChunker {
    pub fn new() -> Self {
        Self { parser: None }
    }
}

impl Default for RubyChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageChunker for RubyChunker {
    fn language(&self) -> Language {
        Language::Ruby
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rb", "rake"]
    }

    fn test_patterns(&self) -> &'static [&'static str] {
        &[r"(^|/)spec/", r"_spec\.rb$", r"(^|/)test/", r"_test\.rb$"]
    }

    fn init(&mut self) -> Result<(), DomainError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_ruby::LANGUAGE.into())
            .map_err(|e| DomainError::parse(format!("Failed to load Ruby grammar: {}", e)))?;
        self.parser = Some(parser);
        Ok(())
    }

    fn chunk_file(
        &mut self,
        absolute_path: &Path,
        content: &str,
        repo_root: &Path,
        max_tokens: usize,
    ) -> Result<Vec<CodeChunk>, DomainError> {
        if content.lines().count() < SMALL_FILE_LINES {
            return Ok(vec![whole_file_chunk(
                absolute_path,
                content,
                repo_root,
                max_tokens,
                self.language(),
                None,
            )]);
        }

        let parser = self
            .parser
            .as_mut()
            .ok_or_else(|| DomainError::internal("RubyChunker used before init"))?;
        let tree = parser.parse(content, None).ok_or_else(|| {
            DomainError::parse(format!("Unparsable file: {}", absolute_path.display()))
        })?;

        let rel = relative_path(absolute_path, repo_root);
        let package = nearest_package_name(absolute_path, repo_root);
        let mut chunks = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            let Some((name, chunk_type)) = classify_declaration(node, content) else {
                continue;
            };
            let snippet = &content[node.byte_range()];
            let chunk = CodeChunk::new(
                rel.clone(),
                package.clone(),
                name,
                chunk_type,
                node.start_position().row as u32 + 1,
                node.end_position().row as u32 + 1,
                build_chunk_content(&rel, content, snippet),
                Language::Ruby,
            )
            .with_exported(true)
            .with_token_budget(max_tokens);
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

fn classify_declaration(node: Node, content: &str) -> Option<(String, ChunkType)> {
    let name = node
        .child_by_field_name("name")
        .map(|n| content[n.byte_range()].to_string())?;
    match node.kind() {
        "method" | "singleton_method" => Some((name, ChunkType::Function)),
        "class" => Some((name, ChunkType::Class)),
        "module" => Some((name, ChunkType::Class)),
        _ => None,
    }
}
