//! C and C++ extraction tables. Names behind pointer and function
//! declarators are found by chasing the declarator chain; struct and
//! class specifiers only count when they carry a body, so that
//! `struct Foo x;` does not re-declare `Foo`.

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::types::SymbolKind;

const C_RULES: &[NodeRule] = &[
    NodeRule::new(
        "function_definition",
        SymbolKind::Function,
        NameSource::Declarator("declarator"),
    ),
    NodeRule::new(
        "struct_specifier",
        SymbolKind::Class,
        NameSource::Field("name"),
    )
    .requires("body"),
    NodeRule::new(
        "enum_specifier",
        SymbolKind::Enum,
        NameSource::Field("name"),
    )
    .requires("body"),
    NodeRule::new(
        "type_definition",
        SymbolKind::TypeAlias,
        NameSource::Declarator("declarator"),
    ),
    NodeRule::new(
        "declaration",
        SymbolKind::Variable,
        NameSource::Declarator("declarator"),
    )
    .top_level(),
];

const CPP_RULES: &[NodeRule] = &[
    NodeRule::new(
        "function_definition",
        SymbolKind::Function,
        NameSource::Declarator("declarator"),
    )
    .method_inside(&["class_specifier", "struct_specifier"]),
    NodeRule::new(
        "class_specifier",
        SymbolKind::Class,
        NameSource::Field("name"),
    )
    .requires("body"),
    NodeRule::new(
        "struct_specifier",
        SymbolKind::Class,
        NameSource::Field("name"),
    )
    .requires("body"),
    NodeRule::new(
        "enum_specifier",
        SymbolKind::Enum,
        NameSource::Field("name"),
    )
    .requires("body"),
    NodeRule::new(
        "type_definition",
        SymbolKind::TypeAlias,
        NameSource::Declarator("declarator"),
    ),
    NodeRule::new(
        "alias_declaration",
        SymbolKind::TypeAlias,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "declaration",
        SymbolKind::Variable,
        NameSource::Declarator("declarator"),
    )
    .top_level(),
];

const INCLUDES: &[ImportRule] = &[ImportRule::new("preproc_include", ImportSource::Field("path"))];

pub fn c() -> LanguageSpec {
    LanguageSpec::new(
        Language::C,
        || tree_sitter_c::LANGUAGE.into(),
        C_RULES,
        ExportRule::TopLevel,
    )
    .with_imports(INCLUDES)
    .with_containers(&["struct_specifier", "enum_specifier"])
    .with_significant(&["translation_unit"])
}

pub fn cpp() -> LanguageSpec {
    LanguageSpec::new(
        Language::Cpp,
        || tree_sitter_cpp::LANGUAGE.into(),
        CPP_RULES,
        ExportRule::TopLevel,
    )
    .with_imports(INCLUDES)
    .with_containers(&["class_specifier", "struct_specifier", "namespace_definition"])
    .with_significant(&["translation_unit", "field_declaration_list", "template_declaration"])
}
