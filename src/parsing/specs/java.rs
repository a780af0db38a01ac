//! Java extraction table. `public` in the modifier list decides
//! `exported`; records map to the class kind.

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::types::SymbolKind;

const RULES: &[NodeRule] = &[
    NodeRule::new(
        "class_declaration",
        SymbolKind::Class,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "record_declaration",
        SymbolKind::Class,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "interface_declaration",
        SymbolKind::Interface,
        NameSource::Field("name"),
    ),
    NodeRule::new("enum_declaration", SymbolKind::Enum, NameSource::Field("name")),
    NodeRule::new(
        "method_declaration",
        SymbolKind::Method,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "constructor_declaration",
        SymbolKind::Method,
        NameSource::Field("name"),
    ),
];

const IMPORTS: &[ImportRule] = &[ImportRule::new(
    "import_declaration",
    ImportSource::TextAfter("import"),
)];

pub fn java() -> LanguageSpec {
    LanguageSpec::new(
        Language::Java,
        || tree_sitter_java::LANGUAGE.into(),
        RULES,
        ExportRule::PublicModifier,
    )
    .with_imports(IMPORTS)
    .with_containers(&[
        "class_declaration",
        "record_declaration",
        "interface_declaration",
        "enum_declaration",
    ])
    .with_significant(&["program", "class_body", "interface_body"])
}
