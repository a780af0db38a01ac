//! PHP extraction table. Top-level declarations are globally visible,
//! so everything extracted at the top level counts as exported.

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::types::SymbolKind;

const RULES: &[NodeRule] = &[
    NodeRule::new(
        "function_definition",
        SymbolKind::Function,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "method_declaration",
        SymbolKind::Method,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "class_declaration",
        SymbolKind::Class,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "interface_declaration",
        SymbolKind::Interface,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "trait_declaration",
        SymbolKind::Interface,
        NameSource::Field("name"),
    ),
    NodeRule::new("enum_declaration", SymbolKind::Enum, NameSource::Field("name")),
    NodeRule::new(
        "const_element",
        SymbolKind::Constant,
        NameSource::ChildKind("name"),
    ),
];

const IMPORTS: &[ImportRule] = &[ImportRule::new(
    "namespace_use_declaration",
    ImportSource::TextAfter("use"),
)];

pub fn php() -> LanguageSpec {
    LanguageSpec::new(
        Language::Php,
        || tree_sitter_php::LANGUAGE_PHP.into(),
        RULES,
        ExportRule::Always,
    )
    .with_imports(IMPORTS)
    .with_containers(&[
        "class_declaration",
        "interface_declaration",
        "trait_declaration",
        "enum_declaration",
    ])
    .with_significant(&["program", "declaration_list"])
}
