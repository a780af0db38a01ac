//! Bash extraction table. `source` and `.` commands are the import
//! edges; top-level assignments become variables.

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::parsing::parser::strip_specifier_quotes;
use crate::types::SymbolKind;
use tree_sitter::Node;

const RULES: &[NodeRule] = &[
    NodeRule::new(
        "function_definition",
        SymbolKind::Function,
        NameSource::Field("name"),
    ),
    NodeRule::new(
        "variable_assignment",
        SymbolKind::Variable,
        NameSource::Field("name"),
    )
    .top_level(),
];

const IMPORTS: &[ImportRule] = &[ImportRule::new("command", ImportSource::Hook)];

fn import_hook(node: &Node, code: &str) -> Option<String> {
    let name = node.child_by_field_name("name")?;
    let command = &code[name.byte_range()];
    if command != "source" && command != "." {
        return None;
    }
    let arg = node.child_by_field_name("argument").or_else(|| {
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        children.into_iter().skip(1).find(|c| {
            matches!(c.kind(), "word" | "string" | "raw_string" | "concatenation")
        })
    })?;
    Some(strip_specifier_quotes(&code[arg.byte_range()]).to_string())
}

pub fn bash() -> LanguageSpec {
    LanguageSpec::new(
        Language::Bash,
        || tree_sitter_bash::LANGUAGE.into(),
        RULES,
        ExportRule::Always,
    )
    .with_imports(IMPORTS)
    .with_significant(&["program"])
    .imported_by(import_hook)
}
