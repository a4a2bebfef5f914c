use std::path::Path;

use tree_sitter::{Node, Parser};

use super::{
    build_chunk_content, nearest_package_name, relative_path, whole_file_chunk, LanguageChunker,
    SMALL_FILE_LINES,
};
use crate::domain::{ChunkType, CodeChunk, DomainError, Language};

/// Rust strategy: top-level items only.
pub struct RustChunker {
    parser: Option<Parser>,
}

impl RustChunker {
    pub fn new() -> Self {
        Self { parser: None }
    }
}

impl Default for RustChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageChunker for RustChunker {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn test_patterns(&self) -> &'static [&'static str] {
        &[r"(^|/)tests/", r"_test\.rs$"]
    }

    fn init(&mut self) -> Result<(), DomainError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .map_err(|e| DomainError::parse(format!("Failed to load Rust grammar: {}", e)))?;
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
            .ok_or_else(|| DomainError::internal("RustChunker used before init"))?;
        let tree = parser.parse(content, None).ok_or_else(|| {
            DomainError::parse(format!("Unparsable file: {}", absolute_path.display()))
        })?;

        let rel = relative_path(absolute_path, repo_root);
        let package = nearest_package_name(absolute_path, repo_root);
        let mut chunks = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();
        for item in root.named_children(&mut cursor) {
            let Some((name, chunk_type)) = classify_item(item, content) else {
                continue;
            };
            let snippet = &content[item.byte_range()];
            let chunk = CodeChunk::new(
                rel.clone(),
                package.clone(),
                name,
                chunk_type,
                item.start_position().row as u32 + 1,
                item.end_position().row as u32 + 1,
                build_chunk_content(&rel, content, snippet),
                Language::Rust,
            )
            .with_exported(is_public(item))
            .with_token_budget(max_tokens);
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

fn classify_item(item: Node, content: &str) -> Option<(String, ChunkType)> {
    let name_of = |field: &str| {
        item.child_by_field_name(field)
            .map(|n| content[n.byte_range()].to_string())
    };
    match item.kind() {
        "function_item" => Some((name_of("name")?, ChunkType::Function)),
        "struct_item" | "enum_item" | "union_item" => Some((name_of("name")?, ChunkType::Type)),
        "trait_item" => Some((name_of("name")?, ChunkType::Interface)),
        "type_item" => Some((name_of("name")?, ChunkType::Type)),
        // An impl block is indexed as one chunk named after its type.
        "impl_item" => Some((name_of("type")?, ChunkType::Class)),
        _ => None,
    }
}

fn is_public(item: Node) -> bool {
    let mut cursor = item.walk();
    let public = item
        .children(&mut cursor)
        .any(|c| c.kind() == "visibility_modifier");
    public
}
