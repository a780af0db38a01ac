//! Python extraction table. Top-level definitions count as exported;
//! module-level assignments become variables.

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::types::SymbolKind;

const RULES: &[NodeRule] = &[
    NodeRule::new(
        "function_definition",
        SymbolKind::Function,
        NameSource::Field("name"),
    )
    .method_inside(&["class_definition"]),
    NodeRule::new(
        "class_definition",
        SymbolKind::Class,
        NameSource::Field("name"),
    ),
    NodeRule::new("assignment", SymbolKind::Variable, NameSource::Field("left")).top_level(),
];

const IMPORTS: &[ImportRule] = &[
    ImportRule::new("import_statement", ImportSource::ChildKind("dotted_name")),
    ImportRule::new("import_from_statement", ImportSource::Field("module_name")),
];

pub fn python() -> LanguageSpec {
    LanguageSpec::new(
        Language::Python,
        || tree_sitter_python::LANGUAGE.into(),
        RULES,
        ExportRule::TopLevel,
    )
    .with_imports(IMPORTS)
    .with_containers(&["class_definition"])
    .with_significant(&["module", "decorated_definition", "block"])
}
