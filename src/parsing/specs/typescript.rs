//! TypeScript and JavaScript extraction tables. TSX/JSX use the same
//! node kinds; the grammar variant is selected at parse time by the
//! registry (`tsx` parses both .ts and .tsx sources).

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::types::SymbolKind;

const TS_RULES: &[NodeRule] = &[
    NodeRule::new(
        "function_declaration",
        SymbolKind::Function,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "generator_function_declaration",
        SymbolKind::Function,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "class_declaration",
        SymbolKind::Class,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "abstract_class_declaration",
        SymbolKind::Class,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "method_definition",
        SymbolKind::Method,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "interface_declaration",
        SymbolKind::Interface,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "type_alias_declaration",
        SymbolKind::TypeAlias,
        NameSource::Field("name"),
    ),
    NodeRule::new("enum_declaration", SymbolKind::Enum, NameSource::Field("name")),
    NodeRule::new(
        "lexical_declaration",
        SymbolKind::Variable,
        NameSource::ChildField {
            child: "variable_declarator",
            field: "name",
        },
    )
    .top_level(),
    NodeRule::new(
        "variable_declaration",
        SymbolKind::Variable,
        NameSource::ChildField {
            child: "variable_declarator",
            field: "name",
        },
    )
    .top_level(),
];

const TS_IMPORTS: &[ImportRule] =
    &[ImportRule::new("import_statement", ImportSource::Field("source"))];

const CONTAINERS: &[&str] = &["class_declaration", "abstract_class_declaration", "interface_declaration", "enum_declaration"];

const EXTRA: &[&str] = &["program", "class_body", "export_statement"];

pub fn typescript() -> LanguageSpec {
    // The TSX grammar is a superset that also accepts plain TS/JSX.
    LanguageSpec::new(
        Language::TypeScript,
        || tree_sitter_typescript::LANGUAGE_TSX.into(),
        TS_RULES,
        ExportRule::ExportStatement,
    )
    .with_imports(TS_IMPORTS)
    .with_containers(CONTAINERS)
    .with_significant(EXTRA)
}

pub fn javascript() -> LanguageSpec {
    LanguageSpec::new(
        Language::JavaScript,
        || tree_sitter_javascript::LANGUAGE.into(),
        TS_RULES,
        ExportRule::ExportStatement,
    )
    .with_imports(TS_IMPORTS)
    .with_containers(CONTAINERS)
    .with_significant(EXTRA)
}
