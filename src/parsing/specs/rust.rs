//! Rust extraction table.
//!
//! Structs map to the class kind like every other record-shaped
//! declaration; traits map to interface. `pub` decides `exported`.

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::types::SymbolKind;

const RULES: &[NodeRule] = &[
    NodeRule::new(
        "function_item",
        SymbolKind::Function,
        NameSource::Field("name"),
    )
    .method_inside(&["impl_item", "trait_item"]),
    NodeRule::new("struct_item", SymbolKind::Class, NameSource::Field("name")),
    NodeRule::new("enum_item", SymbolKind::Enum, NameSource::Field("name")),
    NodeRule::new("trait_item", SymbolKind::Interface, NameSource::Field("name")),
    NodeRule::new("type_item", SymbolKind::TypeAlias, NameSource::Field("name")),
    NodeRule::new("const_item", SymbolKind::Constant, NameSource::Field("name")),
    NodeRule::new("static_item", SymbolKind::Constant, NameSource::Field("name")),
];

const IMPORTS: &[ImportRule] = &[ImportRule::new(
    "use_declaration",
    ImportSource::TextAfter("use"),
)];

pub fn rust() -> LanguageSpec {
    LanguageSpec::new(
        Language::Rust,
        || tree_sitter_rust::LANGUAGE.into(),
        RULES,
        ExportRule::PubKeyword,
    )
    .with_imports(IMPORTS)
    .with_containers(&["impl_item", "trait_item", "mod_item"])
    .with_significant(&["source_file", "declaration_list"])
}
