//! TypeScript/JavaScript import extractor.
//!
//! Uses Tree-sitter's TypeScript grammar (and its TSX variant for
//! `.tsx`/`.jsx`) to find every static module reference in a file:
//! `import ... from`, side-effect imports, re-exports, `require()` and
//! `import()` with a string literal argument.

use super::resolve::resolve_specifier;
use super::{is_supported, ImportExtractor, ImportTree};
use crate::error::ExtractError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tree_sitter::{Language, Node, Parser};

/// The default extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeScriptExtractor;

impl TypeScriptExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ImportExtractor for TypeScriptExtractor {
    fn extract(&self, files: &[PathBuf]) -> Result<ImportTree, ExtractError> {
        let mut ts_parser = new_parser(tree_sitter_typescript::language_typescript())?;
        let mut tsx_parser = new_parser(tree_sitter_typescript::language_tsx())?;
        let mut tree = ImportTree::new();

        for file in files {
            let extension = file
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();

            if !is_supported(&extension) {
                tree.insert(file.clone(), Vec::new());
                continue;
            }

            let source = match fs::read_to_string(file) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Skipping {}: {}", file.display(), ExtractError::io(file, e));
                    tree.record_skipped(file.clone());
                    continue;
                }
            };

            let parser = if extension == "tsx" || extension == "jsx" {
                &mut tsx_parser
            } else {
                &mut ts_parser
            };

            let specifiers = match specifiers_in(parser, &source) {
                Some(specifiers) => specifiers,
                None => {
                    warn!("Skipping {}: Tree-sitter returned no tree", file.display());
                    tree.record_skipped(file.clone());
                    continue;
                }
            };

            let imports = resolve_all(file, &specifiers);
            debug!(
                "{} imports {} local files ({} specifiers)",
                file.display(),
                imports.len(),
                specifiers.len()
            );
            tree.insert(file.clone(), imports);
        }

        Ok(tree)
    }
}

fn new_parser(language: Language) -> Result<Parser, ExtractError> {
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| ExtractError::Initialization(format!("failed to set language: {}", e)))?;
    Ok(parser)
}

fn specifiers_in(parser: &mut Parser, source: &str) -> Option<Vec<String>> {
    let syntax = parser.parse(source, None)?;
    let mut specifiers = Vec::new();
    collect_specifiers(syntax.root_node(), source, &mut specifiers);
    Some(specifiers)
}

fn resolve_all(file: &Path, specifiers: &[String]) -> Vec<PathBuf> {
    let mut imports: Vec<PathBuf> = Vec::new();
    for specifier in specifiers {
        if let Some(resolved) = resolve_specifier(file, specifier) {
            if !imports.contains(&resolved) {
                imports.push(resolved);
            }
        }
    }
    imports
}

/// Recursively collects module specifiers from the AST.
fn collect_specifiers(node: Node, source: &str, out: &mut Vec<String>) {
    match node.kind() {
        "import_statement" | "export_statement" => {
            if let Some(literal) = node.child_by_field_name("source") {
                if let Some(text) = string_literal(&literal, source) {
                    out.push(text);
                }
            }
        }
        // import x = require('./y')
        "import_require_clause" => {
            let literal = node.child_by_field_name("source").or_else(|| {
                let mut cursor = node.walk();
                let found = node
                    .named_children(&mut cursor)
                    .find(|child| child.kind() == "string");
                found
            });
            if let Some(text) = literal.and_then(|l| string_literal(&l, source)) {
                out.push(text);
            }
            return;
        }
        "call_expression" => {
            if let Some(text) = module_call_argument(&node, source) {
                out.push(text);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_specifiers(child, source, out);
    }
}

/// `require('x')` and `import('x')` with a plain string argument.
fn module_call_argument(node: &Node, source: &str) -> Option<String> {
    let function = node.child_by_field_name("function")?;
    let is_module_call = match function.kind() {
        "import" => true,
        "identifier" => function.utf8_text(source.as_bytes()).ok()? == "require",
        _ => false,
    };
    if !is_module_call {
        return None;
    }

    let arguments = node.child_by_field_name("arguments")?;
    let first = arguments.named_child(0)?;
    string_literal(&first, source)
}

fn string_literal(node: &Node, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let raw = node.utf8_text(source.as_bytes()).ok()?;
    let text = raw.trim_matches(|c| c == '"' || c == '\'');
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
