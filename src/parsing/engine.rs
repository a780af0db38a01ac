//! Generic tree-walking symbol extractor.
//!
//! One walk serves every language: the per-language `LanguageSpec` table
//! says which node kinds produce symbols and imports, and the engine
//! handles traversal, error recovery, scope tracking and export
//! decisions. A failing subtree is skipped and recorded as a diagnostic;
//! sibling subtrees still yield symbols.

use crate::parsing::parser::{
    ParseDiagnostic, ParsedFile, depth_exceeded, signature_of, strip_specifier_quotes,
};
use crate::parsing::specs::{ExportRule, ImportSource, LanguageSpec, NameSource};
use crate::types::{Import, Range, Symbol, SymbolCounter, SymbolKind};
use tree_sitter::Node;

/// Upper bound on nodes visited while searching for a descendant name.
const NAME_SEARCH_CAP: usize = 256;

/// Maximum accepted symbol name length in bytes.
const NAME_CAP: usize = 200;

pub fn extract(spec: &LanguageSpec, code: &str) -> ParsedFile {
    let line_count = code.lines().count() as u32;

    let Some(grammar) = spec.grammar else {
        return ParsedFile::empty(spec.language, line_count);
    };

    let mut parser = tree_sitter::Parser::new();
    if parser.set_language(&grammar()).is_err() {
        tracing::error!("Grammar rejected for {}", spec.language);
        return ParsedFile::empty(spec.language, line_count);
    }

    let Some(tree) = parser.parse(code, None) else {
        let mut parsed = ParsedFile::empty(spec.language, line_count);
        parsed.diagnostics.push(ParseDiagnostic {
            line: 0,
            column: 0,
            message: "parser produced no tree".to_string(),
        });
        return parsed;
    };

    let mut walker = Walker {
        spec,
        code,
        counter: SymbolCounter::new(),
        symbols: Vec::new(),
        imports: Vec::new(),
        diagnostics: Vec::new(),
        ancestors: Vec::new(),
        containers: Vec::new(),
        matched_depth: 0,
    };
    walker.walk(tree.root_node(), 0);

    let exports = {
        let mut seen = std::collections::HashSet::new();
        walker
            .symbols
            .iter()
            .filter(|s| s.exported)
            .filter(|s| seen.insert(s.name.clone()))
            .map(|s| s.name.to_string())
            .collect()
    };

    let parse_success = walker.diagnostics.is_empty();
    ParsedFile {
        language: spec.language,
        symbols: walker.symbols,
        imports: walker.imports,
        exports,
        diagnostics: walker.diagnostics,
        parse_success,
        line_count,
    }
}

struct Walker<'a> {
    spec: &'a LanguageSpec,
    code: &'a str,
    counter: SymbolCounter,
    symbols: Vec<Symbol>,
    imports: Vec<Import>,
    diagnostics: Vec<ParseDiagnostic>,
    /// Node kinds along the current path, root first.
    ancestors: Vec<&'static str>,
    /// Names of enclosing container symbols.
    containers: Vec<String>,
    /// Number of extracted symbols on the current path.
    matched_depth: usize,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node: Node, depth: usize) {
        if depth_exceeded(depth) {
            self.diagnostics
                .push(ParseDiagnostic::at(&node, "maximum nesting depth exceeded"));
            return;
        }

        if node.is_error() || node.is_missing() {
            let what = if node.is_missing() { "missing syntax" } else { "syntax error" };
            self.diagnostics.push(ParseDiagnostic::at(&node, what));
            return;
        }

        let kind = node.kind();

        if let Some(rule) = self.spec.import_rule_for(kind) {
            if let Some(specifier) = self.extract_specifier(&node, rule.source) {
                self.imports.push(Import::new(specifier.as_str()));
            }
        }

        let mut pushed_container = false;
        let mut matched = false;

        if let Some(rule) = self.spec.rule_for(kind) {
            let skip = (rule.top_level_only && self.matched_depth > 0)
                || rule
                    .requires_field
                    .is_some_and(|f| node.child_by_field_name(f).is_none());
            if !skip {
                if let Some(name) = self.extract_name(&node, rule.name) {
                    let symbol_kind = self
                        .spec
                        .classify
                        .and_then(|f| f(&node, self.code))
                        .unwrap_or(rule.symbol);
                    let symbol_kind = self.apply_method_rule(symbol_kind, rule.method_inside);
                    let exported = self.is_exported(&node, &name);
                    let range = node_range(&node);

                    let mut symbol =
                        Symbol::new(self.counter.next(), name.as_str(), symbol_kind, range)
                            .exported(exported);
                    if let Some(parent) = self.containers.last() {
                        symbol = symbol.with_parent(parent.as_str());
                    }
                    if matches!(symbol_kind, SymbolKind::Function | SymbolKind::Method) {
                        symbol = symbol.with_signature(signature_of(&node, self.code));
                    }
                    self.symbols.push(symbol);
                    matched = true;

                    if is_container_kind(symbol_kind) {
                        self.containers.push(name);
                        pushed_container = true;
                    }
                }
            }
        } else if self.spec.container_kinds.contains(&kind) {
            // Scope-opening node that is not itself a symbol (e.g. an
            // impl block): track its subject as the enclosing name.
            if let Some(name) = self.container_subject(&node) {
                self.containers.push(name);
                pushed_container = true;
            }
        }

        self.ancestors.push(kind);
        if matched {
            self.matched_depth += 1;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, depth + 1);
        }
        if matched {
            self.matched_depth -= 1;
        }
        self.ancestors.pop();
        if pushed_container {
            self.containers.pop();
        }
    }

    fn apply_method_rule(&self, kind: SymbolKind, method_inside: &[&str]) -> SymbolKind {
        if kind == SymbolKind::Function
            && self.ancestors.iter().any(|a| method_inside.contains(a))
        {
            SymbolKind::Method
        } else {
            kind
        }
    }

    fn extract_name(&self, node: &Node, source: NameSource) -> Option<String> {
        let raw = match source {
            NameSource::Field(field) => {
                let target = node.child_by_field_name(field)?;
                self.text(&target)
            }
            NameSource::ChildField { child, field } => {
                let mut cursor = node.walk();
                let target = node.children(&mut cursor).find(|c| c.kind() == child)?;
                let name_node = target.child_by_field_name(field)?;
                self.text(&name_node)
            }
            NameSource::ChildKind(kind) => {
                let mut cursor = node.walk();
                let target = node.children(&mut cursor).find(|c| c.kind() == kind)?;
                self.text(&target)
            }
            NameSource::Descendant(kind) => {
                let target = find_descendant(node, kind)?;
                self.text(&target)
            }
            NameSource::Declarator(field) => {
                let target = chase_declarator(node.child_by_field_name(field)?)?;
                self.text(&target)
            }
            NameSource::Hook => self.spec.name_hook.and_then(|f| f(node, self.code))?,
        };

        let name = strip_specifier_quotes(raw.trim()).to_string();
        if name.is_empty() || name.len() > NAME_CAP {
            return None;
        }
        // Names found through structural fields must be single tokens;
        // hooks and explicit child kinds may carry spaces (CSS selectors).
        let allow_spaces = matches!(source, NameSource::ChildKind(_) | NameSource::Hook);
        if !allow_spaces && name.chars().any(char::is_whitespace) {
            return None;
        }
        Some(name)
    }

    fn extract_specifier(&self, node: &Node, source: ImportSource) -> Option<String> {
        let raw = match source {
            ImportSource::Field(field) => {
                let target = node.child_by_field_name(field)?;
                self.text(&target)
            }
            ImportSource::ChildKind(kind) => {
                let mut cursor = node.walk();
                let target = node.children(&mut cursor).find(|c| c.kind() == kind)?;
                self.text(&target)
            }
            ImportSource::TextAfter(keyword) => {
                let text = &self.code[node.byte_range()];
                let first_line = text.lines().next().unwrap_or(text);
                first_line
                    .trim()
                    .strip_prefix(keyword)
                    .unwrap_or(first_line)
                    .trim()
                    .trim_end_matches(';')
                    .trim()
                    .to_string()
            }
            ImportSource::Hook => self.spec.import_hook.and_then(|f| f(node, self.code))?,
        };

        let specifier = strip_specifier_quotes(&raw).to_string();
        if specifier.is_empty() || specifier.len() > NAME_CAP {
            None
        } else {
            Some(specifier)
        }
    }

    fn container_subject(&self, node: &Node) -> Option<String> {
        let target = node
            .child_by_field_name("name")
            .or_else(|| node.child_by_field_name("type"))?;
        let name = self.text(&target);
        let name = name.trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            None
        } else {
            Some(name.to_string())
        }
    }

    fn is_exported(&self, node: &Node, name: &str) -> bool {
        match self.spec.export {
            ExportRule::PubKeyword => has_direct_child(node, "visibility_modifier"),
            ExportRule::UppercaseName => name.chars().next().is_some_and(char::is_uppercase),
            ExportRule::ExportStatement => self.ancestors.contains(&"export_statement"),
            ExportRule::PublicModifier => self
                .modifier_text(node)
                .is_some_and(|m| m.contains("public")),
            ExportRule::NotPrivate => !self
                .modifier_text(node)
                .is_some_and(|m| m.contains("private") || m.contains("internal")),
            ExportRule::TopLevel => self.containers.is_empty(),
            ExportRule::Always => true,
            ExportRule::Never => false,
        }
    }

    fn modifier_text(&self, node: &Node) -> Option<String> {
        let mut cursor = node.walk();
        let modifiers = node.children(&mut cursor).find(|c| c.kind() == "modifiers")?;
        Some(self.code[modifiers.byte_range()].to_string())
    }

    fn text(&self, node: &Node) -> String {
        self.code[node.byte_range()].to_string()
    }
}

fn node_range(node: &Node) -> Range {
    let start = node.start_position();
    let end = node.end_position();
    Range::new(
        start.row as u32,
        start.column.min(u16::MAX as usize) as u16,
        end.row as u32,
        end.column.min(u16::MAX as usize) as u16,
    )
}

fn is_container_kind(kind: SymbolKind) -> bool {
    matches!(
        kind,
        SymbolKind::Class | SymbolKind::Interface | SymbolKind::Enum | SymbolKind::Struct
    )
}

fn has_direct_child(node: &Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == kind)
}

/// Preorder search for the first descendant of a kind.
fn find_descendant<'tree>(node: &Node<'tree>, kind: &str) -> Option<Node<'tree>> {
    let mut stack: Vec<Node<'tree>> = Vec::new();
    let mut cursor = node.walk();
    let mut children: Vec<_> = node.children(&mut cursor).collect();
    children.reverse();
    stack.extend(children);

    let mut visited = 0;
    while let Some(current) = stack.pop() {
        visited += 1;
        if visited > NAME_SEARCH_CAP {
            return None;
        }
        if current.kind() == kind {
            return Some(current);
        }
        let mut cursor = current.walk();
        let mut children: Vec<_> = current.children(&mut cursor).collect();
        children.reverse();
        stack.extend(children);
    }
    None
}

/// Follow the declarator chain down to the declared identifier.
fn chase_declarator(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node;
    loop {
        if current.kind().ends_with("identifier") {
            return Some(current);
        }
        if let Some(next) = current.child_by_field_name("declarator") {
            current = next;
            continue;
        }
        return find_descendant(&current, "identifier")
            .or_else(|| find_descendant(&current, "field_identifier"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::Language;
    use crate::parsing::registry::ParserRegistry;

    fn parse(language: Language, code: &str) -> ParsedFile {
        ParserRegistry::new().parse(language, code)
    }

    #[test]
    fn rust_symbols_and_exports() {
        let code = r#"
use std::collections::HashMap;

pub struct Engine {
    map: HashMap<String, u32>,
}

impl Engine {
    pub fn start(&mut self) {}
    fn internal(&self) {}
}

pub trait Runner {
    fn run(&self);
}

const LIMIT: usize = 8;
"#;
        let parsed = parse(Language::Rust, code);
        assert!(parsed.parse_success);

        let names: Vec<&str> = parsed.symbols.iter().map(|s| s.name.as_ref()).collect();
        assert!(names.contains(&"Engine"));
        assert!(names.contains(&"start"));
        assert!(names.contains(&"Runner"));
        assert!(names.contains(&"LIMIT"));

        let engine = parsed.symbols.iter().find(|s| s.name.as_ref() == "Engine").unwrap();
        assert_eq!(engine.kind, SymbolKind::Class);
        assert!(engine.exported);

        let start = parsed.symbols.iter().find(|s| s.name.as_ref() == "start").unwrap();
        assert_eq!(start.kind, SymbolKind::Method);
        assert_eq!(start.parent.as_deref(), Some("Engine"));
        assert!(start.exported);
        assert!(start.signature.as_deref().unwrap().starts_with("pub fn start"));

        let internal = parsed.symbols.iter().find(|s| s.name.as_ref() == "internal").unwrap();
        assert!(!internal.exported);

        assert_eq!(parsed.imports.len(), 1);
        assert_eq!(parsed.imports[0].specifier.as_ref(), "std::collections::HashMap");

        assert!(parsed.exports.contains(&"Engine".to_string()));
        assert!(!parsed.exports.contains(&"internal".to_string()));
    }

    #[test]
    fn typescript_export_statement_detection() {
        let code = r#"
import { Logger } from "./logger";

export class AuthService {
    login(user: string): boolean {
        return user.length > 0;
    }
}

class Hidden {}

export function makeToken(): string {
    return "tok";
}

const retries = 3;
"#;
        let parsed = parse(Language::TypeScript, code);
        assert!(parsed.parse_success);

        let auth = parsed.symbols.iter().find(|s| s.name.as_ref() == "AuthService").unwrap();
        assert_eq!(auth.kind, SymbolKind::Class);
        assert!(auth.exported);

        let login = parsed.symbols.iter().find(|s| s.name.as_ref() == "login").unwrap();
        assert_eq!(login.kind, SymbolKind::Method);
        assert_eq!(login.parent.as_deref(), Some("AuthService"));

        let hidden = parsed.symbols.iter().find(|s| s.name.as_ref() == "Hidden").unwrap();
        assert!(!hidden.exported);

        let retries = parsed.symbols.iter().find(|s| s.name.as_ref() == "retries").unwrap();
        assert_eq!(retries.kind, SymbolKind::Variable);

        assert_eq!(parsed.imports[0].specifier.as_ref(), "./logger");
        assert_eq!(parsed.exports, vec!["AuthService".to_string(), "makeToken".to_string()]);
    }

    #[test]
    fn python_methods_and_module_variables() {
        let code = r#"
import os
from collections import OrderedDict

VERSION = "1.0"

class Indexer:
    def index(self, path):
        local = 1
        return path

def main():
    pass
"#;
        let parsed = parse(Language::Python, code);
        assert!(parsed.parse_success);

        let index = parsed.symbols.iter().find(|s| s.name.as_ref() == "index").unwrap();
        assert_eq!(index.kind, SymbolKind::Method);
        assert_eq!(index.parent.as_deref(), Some("Indexer"));
        assert!(!index.exported);

        let main = parsed.symbols.iter().find(|s| s.name.as_ref() == "main").unwrap();
        assert_eq!(main.kind, SymbolKind::Function);
        assert!(main.exported);

        let version = parsed.symbols.iter().find(|s| s.name.as_ref() == "VERSION").unwrap();
        assert_eq!(version.kind, SymbolKind::Variable);

        // `local` is inside a function, not a module variable
        assert!(!parsed.symbols.iter().any(|s| s.name.as_ref() == "local"));

        let specs: Vec<&str> = parsed.imports.iter().map(|i| i.specifier.as_ref()).collect();
        assert!(specs.contains(&"os"));
        assert!(specs.contains(&"collections"));
    }

    #[test]
    fn go_uppercase_exports_and_type_classification() {
        let code = r#"
package auth

import "fmt"

type Service struct {
    name string
}

type handler interface {
    Handle() error
}

func NewService() *Service { return nil }

func (s *Service) Login() error { return fmt.Errorf("no") }

func helper() {}
"#;
        let parsed = parse(Language::Go, code);
        assert!(parsed.parse_success);

        let service = parsed.symbols.iter().find(|s| s.name.as_ref() == "Service").unwrap();
        assert_eq!(service.kind, SymbolKind::Class);
        assert!(service.exported);

        let handler = parsed.symbols.iter().find(|s| s.name.as_ref() == "handler").unwrap();
        assert_eq!(handler.kind, SymbolKind::Interface);
        assert!(!handler.exported);

        let login = parsed.symbols.iter().find(|s| s.name.as_ref() == "Login").unwrap();
        assert_eq!(login.kind, SymbolKind::Method);

        assert!(!parsed.symbols.iter().find(|s| s.name.as_ref() == "helper").unwrap().exported);
        assert_eq!(parsed.imports[0].specifier.as_ref(), "fmt");
    }

    #[test]
    fn syntax_error_keeps_earlier_symbols() {
        // Unterminated string after a valid class: S4 robustness shape.
        let code = "export class Early {}\nconst broken = \"unterminated\n";
        let parsed = parse(Language::TypeScript, code);

        assert!(!parsed.parse_success);
        assert!(!parsed.diagnostics.is_empty());
        assert!(parsed.symbols.iter().any(|s| s.name.as_ref() == "Early"));
        // Every surviving symbol still has resolved, ordered positions.
        for symbol in &parsed.symbols {
            assert!(symbol.range.is_ordered());
            assert!(symbol.range.end_line <= parsed.line_count);
        }
    }

    #[test]
    fn json_top_level_keys_only() {
        let code = r#"{"name": "demo", "nested": {"inner": true}}"#;
        let parsed = parse(Language::Json, code);
        let names: Vec<&str> = parsed.symbols.iter().map(|s| s.name.as_ref()).collect();
        assert!(names.contains(&"name"));
        assert!(names.contains(&"nested"));
        assert!(!names.contains(&"inner"));
    }

    #[test]
    fn dart_detected_but_unparsed() {
        let parsed = parse(Language::Dart, "void main() {}\n");
        assert!(!parsed.parse_success);
        assert!(parsed.symbols.is_empty());
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn reparsing_is_bit_identical() {
        let code = "pub fn alpha() {}\npub struct Beta;\n";
        let first = parse(Language::Rust, code);
        let second = parse(Language::Rust, code);
        assert_eq!(first.symbols, second.symbols);
        assert_eq!(first.imports, second.imports);
        assert_eq!(first.exports, second.exports);
    }
}
