//! Go extraction table. Exported means uppercase initial; `type_spec`
//! is classified by its type child (struct, interface, alias).

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::types::SymbolKind;
use tree_sitter::Node;

const RULES: &[NodeRule] = &[
    NodeRule::new(
        "function_declaration",
        SymbolKind::Function,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "method_declaration",
        SymbolKind::Method,
        NameSource::Field("name"),
    ),
    NodeRule::new("type_spec", SymbolKind::TypeAlias, NameSource::Field("name")),
    NodeRule::new("const_spec", SymbolKind::Constant, NameSource::Field("name")).top_level(),
    NodeRule::new("var_spec", SymbolKind::Variable, NameSource::Field("name")).top_level(),
];

const IMPORTS: &[ImportRule] = &[ImportRule::new("import_spec", ImportSource::Field("path"))];

fn classify(node: &Node, _code: &str) -> Option<SymbolKind> {
    if node.kind() != "type_spec" {
        return None;
    }
    let type_child = node.child_by_field_name("type")?;
    Some(match type_child.kind() {
        "struct_type" => SymbolKind::Class,
        "interface_type" => SymbolKind::Interface,
        _ => SymbolKind::TypeAlias,
    })
}

pub fn go() -> LanguageSpec {
    LanguageSpec::new(
        Language::Go,
        || tree_sitter_go::LANGUAGE.into(),
        RULES,
        ExportRule::UppercaseName,
    )
    .with_imports(IMPORTS)
    .with_significant(&["source_file", "type_declaration", "import_declaration"])
    .classified_by(classify)
}
