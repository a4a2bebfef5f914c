use std::path::Path;

use tree_sitter::{Node, Parser};

use super::{
    build_chunk_content, nearest_package_name, relative_path, whole_file_chunk, LanguageChunker,
    SMALL_FILE_LINES,
};
use crate::domain::{ChunkType, CodeChunk, DomainError, Language};

/// Python strategy: top-level `def` and `class`, unwrapping decorators.
pub struct PythonChunker {
    parser: Option<Parser>,
}

impl PythonChunker {
    pub fn new() -> Self {
        Self { parser: None }
    }
}

impl Default for PythonChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageChunker for PythonChunker {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn test_patterns(&self) -> &'static [&'static str] {
        &[r"(^|/)test_[^/]+\.py$", r"_test\.py$", r"(^|/)conftest\.py$"]
    }

    fn init(&mut self) -> Result<(), DomainError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| DomainError::parse(format!("Failed to load Python grammar: {}", e)))?;
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
            .ok_or_else(|| DomainError::internal("PythonChunker used before init"))?;
        let tree = parser.parse(content, None).ok_or_else(|| {
            DomainError::parse(format!("Unparsable file: {}", absolute_path.display()))
        })?;

        let rel = relative_path(absolute_path, repo_root);
        let package = nearest_package_name(absolute_path, repo_root);
        let mut chunks = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            // A decorated definition spans its decorators; the inner
            // definition carries the name.
            let (span, definition) = if node.kind() == "decorated_definition" {
                match node.child_by_field_name("definition") {
                    Some(inner) => (node, inner),
                    None => continue,
                }
            } else {
                (node, node)
            };
            let Some((name, chunk_type)) = classify_definition(definition, content) else {
                continue;
            };
            let exported = !name.starts_with('_');
            let snippet = &content[span.byte_range()];
            let chunk = CodeChunk::new(
                rel.clone(),
                package.clone(),
                name,
                chunk_type,
                span.start_position().row as u32 + 1,
                span.end_position().row as u32 + 1,
                build_chunk_content(&rel, content, snippet),
                Language::Python,
            )
            .with_exported(exported)
            .with_token_budget(max_tokens);
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

fn classify_definition(node: Node, content: &str) -> Option<(String, ChunkType)> {
    let name = node
        .child_by_field_name("name")
        .map(|n| content[n.byte_range()].to_string())?;
    match node.kind() {
        "function_definition" => Some((name, ChunkType::Function)),
        "class_definition" => Some((name, ChunkType::Class)),
        _ => None,
    }
}
