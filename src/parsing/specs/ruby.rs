//! Ruby extraction table. `require` calls provide the import edges;
//! constant assignments at the top level become constants.

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::parsing::parser::strip_specifier_quotes;
use crate::types::SymbolKind;
use tree_sitter::Node;

const RULES: &[NodeRule] = &[
    NodeRule::new("method", SymbolKind::Function, NameSource::Field("name"))
        .method_inside(&["class", "module"]),
    NodeRule::new(
        "singleton_method",
        SymbolKind::Function,
        NameSource::Field("name"),
    )
    .method_inside(&["class", "module"]),
    NodeRule::new("class", SymbolKind::Class, NameSource::Field("name")),
    NodeRule::new("module", SymbolKind::Class, NameSource::Field("name")),
    NodeRule::new("assignment", SymbolKind::Variable, NameSource::Field("left")).top_level(),
];

const IMPORTS: &[ImportRule] = &[ImportRule::new("call", ImportSource::Hook)];

fn classify(node: &Node, _code: &str) -> Option<SymbolKind> {
    if node.kind() != "assignment" {
        return None;
    }
    let left = node.child_by_field_name("left")?;
    Some(if left.kind() == "constant" {
        SymbolKind::Constant
    } else {
        SymbolKind::Variable
    })
}

fn import_hook(node: &Node, code: &str) -> Option<String> {
    let method = node.child_by_field_name("method")?;
    let name = &code[method.byte_range()];
    if name != "require" && name != "require_relative" {
        return None;
    }
    let args = node.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    let first = args
        .children(&mut cursor)
        .find(|c| c.kind() == "string" || c.kind() == "string_content")?;
    Some(strip_specifier_quotes(&code[first.byte_range()]).to_string())
}

pub fn ruby() -> LanguageSpec {
    LanguageSpec::new(
        Language::Ruby,
        || tree_sitter_ruby::LANGUAGE.into(),
        RULES,
        ExportRule::TopLevel,
    )
    .with_imports(IMPORTS)
    .with_containers(&["class", "module"])
    .with_significant(&["program", "body_statement"])
    .classified_by(classify)
    .imported_by(import_hook)
}
