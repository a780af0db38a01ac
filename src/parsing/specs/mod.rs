//! Per-language extraction tables.
//!
//! Each language contributes a `LanguageSpec`: the tree-sitter grammar,
//! the node kinds that yield symbols, how names are found, how exports
//! are decided, and where import specifiers live. The generic walking
//! engine (`parsing::engine`) interprets these tables; languages with
//! irregular shapes plug in small hook functions.

mod bash;
mod c_cpp;
mod data;
mod go;
mod java;
mod kotlin;
mod php;
mod python;
mod ruby;
mod rust;
mod typescript;
mod web;

use crate::parsing::Language;
use crate::types::SymbolKind;
use tree_sitter::Node;

/// Where a symbol's name is found relative to its declaration node.
#[derive(Debug, Clone, Copy)]
pub enum NameSource {
    /// A named field on the node (`name`, `left`, ...).
    Field(&'static str),
    /// A field on a child of the given kind.
    ChildField {
        child: &'static str,
        field: &'static str,
    },
    /// The first child of the given kind.
    ChildKind(&'static str),
    /// The first descendant of the given kind (breadth-first).
    Descendant(&'static str),
    /// Chase a declarator field chain down to an identifier (C/C++).
    Declarator(&'static str),
    /// Delegate to the language's `name_hook`.
    Hook,
}

/// How `exported` is decided for a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportRule {
    /// A `visibility_modifier` child is present (Rust `pub`).
    PubKeyword,
    /// The name starts with an uppercase letter (Go).
    UppercaseName,
    /// An `export_statement` ancestor exists (TS/JS).
    ExportStatement,
    /// A `modifiers` child contains `public` (Java).
    PublicModifier,
    /// Exported unless modifiers contain `private` or `internal` (Kotlin).
    NotPrivate,
    /// Exported when declared at the top level (Python, C, Ruby).
    TopLevel,
    Always,
    Never,
}

/// Where an import specifier lives.
#[derive(Debug, Clone, Copy)]
pub enum ImportSource {
    /// A named field on the import node (quotes stripped).
    Field(&'static str),
    /// The first child of the given kind.
    ChildKind(&'static str),
    /// The node's own text with a leading keyword and trailing `;` removed.
    TextAfter(&'static str),
    /// Delegate to the language's `import_hook`.
    Hook,
}

/// One symbol-producing node kind.
#[derive(Debug, Clone, Copy)]
pub struct NodeRule {
    pub kind: &'static str,
    pub symbol: SymbolKind,
    pub name: NameSource,
    /// Ancestor kinds that turn a Function into a Method.
    pub method_inside: &'static [&'static str],
    /// Only extract when not nested inside another extracted symbol.
    pub top_level_only: bool,
    /// Skip unless the node carries this field (e.g. a `body`, so that
    /// `struct Foo x;` references do not re-declare `Foo`).
    pub requires_field: Option<&'static str>,
}

impl NodeRule {
    pub const fn new(kind: &'static str, symbol: SymbolKind, name: NameSource) -> Self {
        Self {
            kind,
            symbol,
            name,
            method_inside: &[],
            top_level_only: false,
            requires_field: None,
        }
    }

    pub const fn method_inside(mut self, kinds: &'static [&'static str]) -> Self {
        self.method_inside = kinds;
        self
    }

    pub const fn top_level(mut self) -> Self {
        self.top_level_only = true;
        self
    }

    pub const fn requires(mut self, field: &'static str) -> Self {
        self.requires_field = Some(field);
        self
    }
}

/// One import-producing node kind.
#[derive(Debug, Clone, Copy)]
pub struct ImportRule {
    pub kind: &'static str,
    pub source: ImportSource,
}

impl ImportRule {
    pub const fn new(kind: &'static str, source: ImportSource) -> Self {
        Self { kind, source }
    }
}

/// The complete extraction table for one language.
pub struct LanguageSpec {
    pub language: Language,
    /// Grammar constructor; `None` for detected-but-unparsed languages.
    pub grammar: Option<fn() -> tree_sitter::Language>,
    pub rules: &'static [NodeRule],
    pub export: ExportRule,
    pub imports: &'static [ImportRule],
    /// Kinds that establish an enclosing scope for `parent` tracking.
    pub container_kinds: &'static [&'static str],
    /// Extra node kinds kept in the compact tree beyond rule and import
    /// kinds.
    pub extra_significant: &'static [&'static str],
    /// Refines the symbol kind for a matched node (e.g. Go `type_spec`).
    pub classify: Option<fn(&Node, &str) -> Option<SymbolKind>>,
    /// Name extraction for `NameSource::Hook`.
    pub name_hook: Option<fn(&Node, &str) -> Option<String>>,
    /// Specifier extraction for `ImportSource::Hook`.
    pub import_hook: Option<fn(&Node, &str) -> Option<String>>,
}

impl LanguageSpec {
    pub fn new(
        language: Language,
        grammar: fn() -> tree_sitter::Language,
        rules: &'static [NodeRule],
        export: ExportRule,
    ) -> Self {
        Self {
            language,
            grammar: Some(grammar),
            rules,
            export,
            imports: &[],
            container_kinds: &[],
            extra_significant: &[],
            classify: None,
            name_hook: None,
            import_hook: None,
        }
    }

    /// A detected language without a wired grammar: files parse empty.
    pub fn ungrammared(language: Language) -> Self {
        Self {
            language,
            grammar: None,
            rules: &[],
            export: ExportRule::Never,
            imports: &[],
            container_kinds: &[],
            extra_significant: &[],
            classify: None,
            name_hook: None,
            import_hook: None,
        }
    }

    pub fn with_imports(mut self, rules: &'static [ImportRule]) -> Self {
        self.imports = rules;
        self
    }

    pub fn with_containers(mut self, kinds: &'static [&'static str]) -> Self {
        self.container_kinds = kinds;
        self
    }

    pub fn with_significant(mut self, kinds: &'static [&'static str]) -> Self {
        self.extra_significant = kinds;
        self
    }

    pub fn classified_by(mut self, hook: fn(&Node, &str) -> Option<SymbolKind>) -> Self {
        self.classify = Some(hook);
        self
    }

    pub fn named_by(mut self, hook: fn(&Node, &str) -> Option<String>) -> Self {
        self.name_hook = Some(hook);
        self
    }

    pub fn imported_by(mut self, hook: fn(&Node, &str) -> Option<String>) -> Self {
        self.import_hook = Some(hook);
        self
    }

    pub fn rule_for(&self, kind: &str) -> Option<&NodeRule> {
        self.rules.iter().find(|r| r.kind == kind)
    }

    pub fn import_rule_for(&self, kind: &str) -> Option<&ImportRule> {
        self.imports.iter().find(|r| r.kind == kind)
    }

    /// A node kind is significant for the compact tree when it produces
    /// symbols or imports, opens a scope, or is listed explicitly.
    pub fn is_significant(&self, kind: &str) -> bool {
        self.rules.iter().any(|r| r.kind == kind)
            || self.imports.iter().any(|r| r.kind == kind)
            || self.container_kinds.contains(&kind)
            || self.extra_significant.contains(&kind)
    }
}

/// All specs, one per detected language. Order is stable.
pub fn all_specs() -> Vec<LanguageSpec> {
    vec![
        typescript::typescript(),
        typescript::javascript(),
        python::python(),
        java::java(),
        c_cpp::c(),
        c_cpp::cpp(),
        rust::rust(),
        go::go(),
        ruby::ruby(),
        php::php(),
        kotlin::kotlin(),
        dart(),
        bash::bash(),
        web::html(),
        web::css(),
        data::json(),
        data::yaml(),
        data::toml(),
    ]
}

/// Dart is detected but carries no grammar: no maintained registry crate
/// targets the current tree-sitter ABI. Files parse empty with
/// `parse_success = false`.
fn dart() -> LanguageSpec {
    LanguageSpec::ungrammared(Language::Dart)
}
