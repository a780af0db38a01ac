//! Kotlin extraction table. Visibility is public by default, so a symbol
//! is exported unless its modifiers say `private` or `internal`. Class
//! declarations are re-classified by their leading keyword (interface,
//! enum class, plain class).

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::types::SymbolKind;
use tree_sitter::Node;

const RULES: &[NodeRule] = &[
    NodeRule::new(
        "function_declaration",
        SymbolKind::Function,
        NameSource::Descendant("simple_identifier"),
    )
    .method_inside(&["class_declaration", "object_declaration"]),
    NodeRule::new(
        "class_declaration",
        SymbolKind::Class,
        NameSource::Descendant("type_identifier"),
    ),
    NodeRule::new(
        "object_declaration",
        SymbolKind::Class,
        NameSource::Descendant("type_identifier"),
    ),
    NodeRule::new(
        "type_alias",
        SymbolKind::TypeAlias,
        NameSource::Descendant("type_identifier"),
    ),
    NodeRule::new(
        "property_declaration",
        SymbolKind::Variable,
        NameSource::Descendant("simple_identifier"),
    )
    .top_level(),
];

const IMPORTS: &[ImportRule] = &[ImportRule::new(
    "import_header",
    ImportSource::TextAfter("import"),
)];

fn classify(node: &Node, code: &str) -> Option<SymbolKind> {
    if node.kind() != "class_declaration" {
        return None;
    }
    let mut cursor = node.walk();
    let mut is_enum = false;
    for child in node.children(&mut cursor) {
        match child.kind() {
            "interface" => return Some(SymbolKind::Interface),
            "modifiers" => {
                if code[child.byte_range()].contains("enum") {
                    is_enum = true;
                }
            }
            _ => {}
        }
    }
    Some(if is_enum { SymbolKind::Enum } else { SymbolKind::Class })
}

pub fn kotlin() -> LanguageSpec {
    LanguageSpec::new(
        Language::Kotlin,
        tree_sitter_kotlin_codanna::language,
        RULES,
        ExportRule::NotPrivate,
    )
    .with_imports(IMPORTS)
    .with_containers(&["class_declaration", "object_declaration"])
    .with_significant(&["source_file", "class_body"])
    .classified_by(classify)
}
