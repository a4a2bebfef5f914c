use std::path::Path;

use tree_sitter::{Node, Parser};

use super::{
    build_chunk_content, framework_role_for, is_http_method, nearest_package_name, relative_path,
    whole_file_chunk, LanguageChunker, SMALL_FILE_LINES,
};
use crate::domain::{ChunkType, CodeChunk, DomainError, FrameworkRole, Language};

/// TypeScript / JavaScript strategy. Handles framework roles (app-router
/// pages, layouts, middleware, API routes), hooks, components and the
/// export-wrapper flag on top of plain symbol extraction.
pub struct TypeScriptChunker {
    parser: Option<Parser>,
}

impl TypeScriptChunker {
    pub fn new() -> Self {
        Self { parser: None }
    }

    fn grammar_for(path: &Path) -> tree_sitter::Language {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tsx") => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Some("ts") => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            // JSX can appear in plain .js files; the TSX grammar parses both.
            Some("jsx") => tree_sitter_typescript::LANGUAGE_TSX.into(),
            _ => tree_sitter_javascript::LANGUAGE.into(),
        }
    }

    fn parse(&mut self, path: &Path, content: &str) -> Result<tree_sitter::Tree, DomainError> {
        let parser = self
            .parser
            .as_mut()
            .ok_or_else(|| DomainError::internal("TypeScriptChunker used before init"))?;
        parser
            .set_language(&Self::grammar_for(path))
            .map_err(|e| DomainError::parse(format!("Failed to set grammar: {}", e)))?;
        parser
            .parse(content, None)
            .ok_or_else(|| DomainError::parse(format!("Unparsable file: {}", path.display())))
    }
}

impl Default for TypeScriptChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageChunker for TypeScriptChunker {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
    }

    fn test_patterns(&self) -> &'static [&'static str] {
        &[
            r"\.test\.[jt]sx?$",
            r"\.spec\.[jt]sx?$",
            r"(^|/)__tests__/",
            r"(^|/)__mocks__/",
        ]
    }

    fn init(&mut self) -> Result<(), DomainError> {
        self.parser = Some(Parser::new());
        Ok(())
    }

    fn chunk_file(
        &mut self,
        absolute_path: &Path,
        content: &str,
        repo_root: &Path,
        max_tokens: usize,
    ) -> Result<Vec<CodeChunk>, DomainError> {
        let rel = relative_path(absolute_path, repo_root);
        let role = framework_role_for(&rel);

        // page / layout / middleware files are one whole-file chunk
        // regardless of size.
        if matches!(
            role,
            Some(FrameworkRole::Page) | Some(FrameworkRole::Layout) | Some(FrameworkRole::Middleware)
        ) {
            return Ok(vec![whole_file_chunk(
                absolute_path,
                content,
                repo_root,
                max_tokens,
                Language::from_path(absolute_path),
                role,
            )]);
        }

        if role == Some(FrameworkRole::ApiRoute) {
            return self.chunk_api_route(absolute_path, content, repo_root, max_tokens, &rel);
        }

        if content.lines().count() < SMALL_FILE_LINES {
            return Ok(vec![whole_file_chunk(
                absolute_path,
                content,
                repo_root,
                max_tokens,
                Language::from_path(absolute_path),
                None,
            )]);
        }

        let tree = self.parse(absolute_path, content)?;
        let package = nearest_package_name(absolute_path, repo_root);
        let mut chunks = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            collect_top_level(child, content, &rel, &package, max_tokens, &mut chunks);
        }
        Ok(chunks)
    }
}

/// API route files emit one `Route` chunk per exported HTTP-method symbol,
/// falling back to a whole-file chunk when none are found.
impl TypeScriptChunker {
    fn chunk_api_route(
        &mut self,
        absolute_path: &Path,
        content: &str,
        repo_root: &Path,
        max_tokens: usize,
        rel: &str,
    ) -> Result<Vec<CodeChunk>, DomainError> {
        let tree = self.parse(absolute_path, content)?;
        let package = nearest_package_name(absolute_path, repo_root);
        let mut chunks = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if child.kind() != "export_statement" {
                continue;
            }
            let mut inner_cursor = child.walk();
            for inner in child.named_children(&mut inner_cursor) {
                for (name, span_node, _kind) in declared_symbols(inner, content) {
                    if !is_http_method(&name) {
                        continue;
                    }
                    let snippet = node_text(child, content);
                    let chunk = CodeChunk::new(
                        rel.to_string(),
                        package.clone(),
                        name,
                        ChunkType::Route,
                        line_start(child),
                        line_end(span_node.max_by_end(child)),
                        build_chunk_content(rel, content, snippet),
                        Language::from_path(absolute_path),
                    )
                    .with_exported(true)
                    .with_framework_role(FrameworkRole::ApiRoute)
                    .with_token_budget(max_tokens);
                    chunks.push(chunk);
                }
            }
        }
        if chunks.is_empty() {
            chunks.push(whole_file_chunk(
                absolute_path,
                content,
                repo_root,
                max_tokens,
                Language::from_path(absolute_path),
                Some(FrameworkRole::ApiRoute),
            ));
        }
        Ok(chunks)
    }
}

trait MaxByEnd<'a> {
    fn max_by_end(self, other: Node<'a>) -> Node<'a>;
}

impl<'a> MaxByEnd<'a> for Node<'a> {
    fn max_by_end(self, other: Node<'a>) -> Node<'a> {
        if self.end_byte() >= other.end_byte() {
            self
        } else {
            other
        }
    }
}

fn line_start(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn line_end(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

fn node_text<'a>(node: Node, content: &'a str) -> &'a str {
    &content[node.byte_range()]
}

fn field_text<'a>(node: Node, field: &str, content: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, content))
}

/// `(name, node, kind)` triples declared by one top-level node. A
/// `lexical_declaration` can bind several declarators.
fn declared_symbols<'a>(node: Node<'a>, content: &str) -> Vec<(String, Node<'a>, &'static str)> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => field_text(node, "name", content)
            .map(|name| vec![(name.to_string(), node, "function")])
            .unwrap_or_default(),
        "class_declaration" => field_text(node, "name", content)
            .map(|name| vec![(name.to_string(), node, "class")])
            .unwrap_or_default(),
        "interface_declaration" => field_text(node, "name", content)
            .map(|name| vec![(name.to_string(), node, "interface")])
            .unwrap_or_default(),
        "type_alias_declaration" => field_text(node, "name", content)
            .map(|name| vec![(name.to_string(), node, "type")])
            .unwrap_or_default(),
        "enum_declaration" => field_text(node, "name", content)
            .map(|name| vec![(name.to_string(), node, "type")])
            .unwrap_or_default(),
        "lexical_declaration" | "variable_declaration" => {
            let mut symbols = Vec::new();
            let mut cursor = node.walk();
            for declarator in node.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name) = field_text(declarator, "name", content) else {
                    continue;
                };
                let Some(value) = declarator.child_by_field_name("value") else {
                    continue;
                };
                match value.kind() {
                    "arrow_function" | "function_expression" | "generator_function" => {
                        symbols.push((name.to_string(), declarator, "binding_function"));
                    }
                    "object" if name.to_lowercase().ends_with("config") => {
                        symbols.push((name.to_string(), declarator, "config"));
                    }
                    _ => {}
                }
            }
            symbols
        }
        _ => Vec::new(),
    }
}

/// Walks one top-level node, unwrapping `export_statement` and emitting a
/// chunk per declared symbol.
fn collect_top_level(
    node: Node,
    content: &str,
    rel: &str,
    package: &str,
    max_tokens: usize,
    chunks: &mut Vec<CodeChunk>,
) {
    let language = Language::from_path(Path::new(rel));
    if node.kind() == "export_statement" {
        let mut cursor = node.walk();
        for inner in node.named_children(&mut cursor) {
            for (name, _symbol_node, kind) in declared_symbols(inner, content) {
                // The chunk spans the whole export statement so the snippet
                // keeps the `export` keyword.
                push_chunk(
                    node, inner, name, kind, content, rel, package, language, max_tokens, true,
                    chunks,
                );
            }
        }
        return;
    }
    for (name, symbol_node, kind) in declared_symbols(node, content) {
        let span = if node.kind() == "lexical_declaration" || node.kind() == "variable_declaration"
        {
            node
        } else {
            symbol_node
        };
        push_chunk(
            span, node, name, kind, content, rel, package, language, max_tokens, false, chunks,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn push_chunk(
    span: Node,
    declaration: Node,
    name: String,
    kind: &str,
    content: &str,
    rel: &str,
    package: &str,
    language: Language,
    max_tokens: usize,
    exported: bool,
    chunks: &mut Vec<CodeChunk>,
) {
    let chunk_type = classify(&name, kind, declaration);
    let snippet = node_text(span, content);
    let chunk = CodeChunk::new(
        rel.to_string(),
        package.to_string(),
        name,
        chunk_type,
        line_start(span),
        line_end(span),
        build_chunk_content(rel, content, snippet),
        language,
    )
    .with_exported(exported)
    .with_token_budget(max_tokens);
    chunks.push(chunk);
}

/// Classification order: HTTP-method names, hook names, PascalCase
/// function bodies containing JSX, then the node kind.
fn classify(name: &str, kind: &str, declaration: Node) -> ChunkType {
    if is_http_method(name) {
        return ChunkType::Route;
    }
    if is_hook_name(name) {
        return ChunkType::Hook;
    }
    if is_pascal_case(name)
        && matches!(kind, "function" | "binding_function")
        && contains_jsx(declaration)
    {
        return ChunkType::Component;
    }
    match kind {
        "function" | "binding_function" => ChunkType::Function,
        "class" => ChunkType::Class,
        "interface" => ChunkType::Interface,
        "type" => ChunkType::Type,
        "config" => ChunkType::Config,
        _ => ChunkType::Other,
    }
}

fn is_hook_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('u')
        && chars.next() == Some('s')
        && chars.next() == Some('e')
        && chars.next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
}

fn is_pascal_case(name: &str) -> bool {
    let mut chars = name.chars();
    let first_upper = chars.next().map(|c| c.is_ascii_uppercase()).unwrap_or(false);
    first_upper && name.chars().any(|c| c.is_ascii_lowercase())
}

/// True when the subtree contains any JSX node.
fn contains_jsx(node: Node) -> bool {
    if node.kind().starts_with("jsx") {
        return true;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if contains_jsx(child) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, rel: &str) -> Vec<CodeChunk> {
        let mut chunker = TypeScriptChunker::new();
        chunker.init().unwrap();
        let root = Path::new("/repo");
        chunker
            .chunk_file(&root.join(rel), source, root, 512)
            .unwrap()
    }

    #[test]
    fn test_small_file_yields_one_other_chunk() {
        let source = "export const x = 1;\n";
        let chunks = chunk(source, "src/util.ts");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type(), ChunkType::Other);
        assert_eq!(chunks[0].line_start(), 1);
        assert!(chunks[0].framework_role().is_none());
    }

    #[test]
    fn test_api_route_emits_method_chunks_only() {
        let source = r#"
import { NextResponse } from 'next/server';

export async function GET(request: Request) {
  return NextResponse.json({ items: [] });
}

export async function POST(request: Request) {
  return NextResponse.json({ created: true });
}
"#;
        let chunks = chunk(source, "app/api/items/route.ts");
        assert_eq!(chunks.len(), 2);
        let names: Vec<&str> = chunks.iter().map(|c| c.name()).collect();
        assert!(names.contains(&"GET"));
        assert!(names.contains(&"POST"));
        for c in &chunks {
            assert_eq!(c.chunk_type(), ChunkType::Route);
            assert_eq!(c.framework_role(), Some(FrameworkRole::ApiRoute));
            assert!(c.exported());
        }
    }

    #[test]
    fn test_api_route_without_methods_falls_back_to_whole_file() {
        let source = "const helper = 1;\nexport default helper;\n";
        let chunks = chunk(source, "app/api/legacy/route.ts");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].framework_role(), Some(FrameworkRole::ApiRoute));
    }

    #[test]
    fn test_page_file_is_single_chunk_even_when_large() {
        let mut source = String::from("export default function Page() {\n");
        for i in 0..80 {
            source.push_str(&format!("  const x{} = {};\n", i, i));
        }
        source.push_str("  return null;\n}\n");
        let chunks = chunk(&source, "app/dashboard/page.tsx");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].framework_role(), Some(FrameworkRole::Page));
    }

    #[test]
    fn test_hook_and_component_classification() {
        let mut source = String::new();
        for i in 0..50 {
            source.push_str(&format!("// pad {}\n", i));
        }
        source.push_str(
            r#"
export function useCounter(initial: number) {
  return initial + 1;
}

export const Button = (props: { label: string }) => {
  return <button>{props.label}</button>;
};

export interface ButtonProps {
  label: string;
}

export type Label = string;
"#,
        );
        let chunks = chunk(&source, "src/components/button.tsx");
        let by_name = |n: &str| chunks.iter().find(|c| c.name() == n).unwrap();
        assert_eq!(by_name("useCounter").chunk_type(), ChunkType::Hook);
        assert_eq!(by_name("Button").chunk_type(), ChunkType::Component);
        assert_eq!(by_name("ButtonProps").chunk_type(), ChunkType::Interface);
        assert_eq!(by_name("Label").chunk_type(), ChunkType::Type);
        assert!(chunks.iter().all(|c| c.exported()));
    }

    #[test]
    fn test_unexported_function_in_large_file() {
        let mut source = String::new();
        for i in 0..50 {
            source.push_str(&format!("// pad {}\n", i));
        }
        source.push_str("function helper(a: number) {\n  return a * 2;\n}\n");
        let chunks = chunk(&source, "src/helper.ts");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name(), "helper");
        assert_eq!(chunks[0].chunk_type(), ChunkType::Function);
        assert!(!chunks[0].exported());
    }

    #[test]
    fn test_chunk_body_carries_file_header() {
        let chunks = chunk("export const x = 1;\n", "src/util.ts");
        assert!(chunks[0].content().starts_with("// file: src/util.ts\n"));
    }
}
