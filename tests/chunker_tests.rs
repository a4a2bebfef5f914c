use std::path::Path;

use repolens::{ChunkType, ChunkerRegistry, FrameworkRole};

fn chunk(registry: &mut ChunkerRegistry, rel: &str, content: &str) -> Vec<repolens::CodeChunk> {
    let root = Path::new("/repo");
    registry
        .chunk_file(&root.join(rel), content, root, 512)
        .expect("chunk_file")
        .expect("strategy for extension")
}

#[test]
fn small_file_produces_exactly_one_chunk() {
    let mut registry = ChunkerRegistry::with_default_languages().expect("registry");
    let content = "export const x = 1;\n";
    let chunks = chunk(&mut registry, "util.ts", content);

    assert_eq!(chunks.len(), 1);
    let only = &chunks[0];
    assert_eq!(only.chunk_type(), ChunkType::Other);
    assert_eq!(only.line_start(), 1);
    assert!(!only.exported());
    assert!(only.framework_role().is_none());
}

#[test]
fn api_route_with_method_exports_produces_only_method_chunks() {
    let mut registry = ChunkerRegistry::with_default_languages().expect("registry");
    let content = r#"
import { NextResponse } from 'next/server';

export async function GET(request: Request) {
  return NextResponse.json({ items: [] });
}

export async function POST(request: Request) {
  return NextResponse.json({ ok: true });
}
"#;
    let chunks = chunk(&mut registry, "app/api/items/route.ts", content);

    assert_eq!(chunks.len(), 2);
    let names: Vec<&str> = chunks.iter().map(|c| c.name()).collect();
    assert!(names.contains(&"GET"));
    assert!(names.contains(&"POST"));
    for c in &chunks {
        assert_eq!(c.chunk_type(), ChunkType::Route);
        assert_eq!(c.framework_role(), Some(FrameworkRole::ApiRoute));
    }
}

#[test]
fn chunk_ids_are_stable_across_runs() {
    let mut first_registry = ChunkerRegistry::with_default_languages().expect("registry");
    let mut second_registry = ChunkerRegistry::with_default_languages().expect("registry");
    let content = "export const x = 1;\n";

    let first = chunk(&mut first_registry, "src/util.ts", content);
    let second = chunk(&mut second_registry, "src/util.ts", content);
    assert_eq!(first[0].id(), second[0].id());
    assert_eq!(first[0].id().len(), 16);
}

#[test]
fn unknown_extensions_are_silently_skipped() {
    let mut registry = ChunkerRegistry::with_default_languages().expect("registry");
    let root = Path::new("/repo");
    let result = registry
        .chunk_file(&root.join("README.md"), "# readme\n", root, 512)
        .expect("chunk_file");
    assert!(result.is_none());
}

#[test]
fn test_files_are_recognized_per_language() {
    let registry = ChunkerRegistry::with_default_languages().expect("registry");
    assert!(registry.is_test_file("src/auth/login.test.ts"));
    assert!(registry.is_test_file("src/__tests__/setup.ts"));
    assert!(registry.is_test_file("spec/models/user_spec.rb"));
    assert!(registry.is_test_file("tests/integration.rs"));
    assert!(registry.is_test_file("pkg/test_handlers.py"));
    assert!(!registry.is_test_file("src/auth/login.ts"));
}

#[test]
fn every_chunk_body_leads_with_the_file_header() {
    let mut registry = ChunkerRegistry::with_default_languages().expect("registry");
    let mut content = String::new();
    for i in 0..60 {
        content.push_str(&format!("// pad {}\n", i));
    }
    content.push_str("export function handler(a: number) {\n  return a;\n}\n");
    let chunks = chunk(&mut registry, "src/handler.ts", &content);

    assert!(!chunks.is_empty());
    for c in &chunks {
        assert!(c.content().starts_with("// file: src/handler.ts\n"));
    }
}

#[test]
fn oversized_symbols_are_truncated_with_marker() {
    let mut registry = ChunkerRegistry::with_default_languages().expect("registry");
    let root = Path::new("/repo");
    let mut content = String::new();
    for i in 0..60 {
        content.push_str(&format!("// pad {}\n", i));
    }
    content.push_str("export function big() {\n");
    for i in 0..2_000 {
        content.push_str(&format!("  const padding_{} = {};\n", i, i));
    }
    content.push_str("  return 0;\n}\n");

    let chunks = registry
        .chunk_file(&root.join("src/big.ts"), &content, root, 128)
        .expect("chunk_file")
        .expect("chunks");
    let big = chunks.iter().find(|c| c.name() == "big").expect("big chunk");
    assert!(big.content().ends_with("…truncated"));
    assert!(big.content().len() <= 128 * 4 + "…truncated".len() + 1);
}
