//! Parse output types and shared tree-walking helpers.

use crate::parsing::Language;
use crate::types::{Import, Symbol};
use serde::{Deserialize, Serialize};
use tree_sitter::Node;

/// Nesting ceiling for AST traversal. Subtrees past this depth are
/// skipped with a diagnostic; the value keeps the recursion comfortably
/// inside a default 2 MiB thread stack (see DESIGN.md).
pub const MAX_AST_DEPTH: usize = 500;

/// Byte cap for extracted signatures.
pub const SIGNATURE_CAP: usize = 160;

/// One recorded parse problem. Positions are zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub line: u32,
    pub column: u16,
    pub message: String,
}

impl ParseDiagnostic {
    pub fn at(node: &Node, message: impl Into<String>) -> Self {
        let pos = node.start_position();
        Self {
            line: pos.row as u32,
            column: pos.column.min(u16::MAX as usize) as u16,
            message: message.into(),
        }
    }
}

/// Everything one parse pass extracts from a file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub language: Language,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
    /// Names of exported symbols, in extraction order.
    pub exports: Vec<String>,
    pub diagnostics: Vec<ParseDiagnostic>,
    pub parse_success: bool,
    pub line_count: u32,
}

impl ParsedFile {
    /// Empty parse for unknown or unparseable languages. Not an error.
    pub fn empty(language: Language, line_count: u32) -> Self {
        Self {
            language,
            symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            diagnostics: Vec::new(),
            parse_success: false,
            line_count,
        }
    }
}

/// Cap a string at `max_bytes` without splitting a UTF-8 character:
/// the cut lands on the last character start at or before the cap.
#[inline]
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let end = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_bytes)
        .last()
        .unwrap_or(0);
    &s[..end]
}

/// First line of a declaration, trimmed and length-capped. Used as the
/// signature of function and method symbols.
pub fn signature_of(node: &Node, code: &str) -> String {
    let text = &code[node.byte_range()];
    let first_line = text.lines().next().unwrap_or("").trim();
    truncate_utf8(first_line, SIGNATURE_CAP).to_string()
}

/// Depth guard for recursive traversal.
#[inline]
pub fn depth_exceeded(depth: usize) -> bool {
    depth > MAX_AST_DEPTH
}

/// Strip matching quotes (single, double, angle brackets) from an import
/// specifier as written in source.
pub fn strip_specifier_quotes(raw: &str) -> &str {
    let trimmed = raw.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        let matched = matches!(
            (first, last),
            (b'"', b'"') | (b'\'', b'\'') | (b'<', b'>') | (b'`', b'`')
        );
        if matched {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}
