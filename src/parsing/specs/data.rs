//! JSON, YAML and TOML extraction tables. Data files have no code
//! symbols; their top-level keys and table headers surface as variables
//! so configuration files rank on key names.

use super::{ExportRule, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::types::SymbolKind;
use tree_sitter::Node;

const JSON_RULES: &[NodeRule] = &[NodeRule::new(
    "pair",
    SymbolKind::Variable,
    NameSource::Field("key"),
)
.top_level()];

pub fn json() -> LanguageSpec {
    LanguageSpec::new(
        Language::Json,
        || tree_sitter_json::LANGUAGE.into(),
        JSON_RULES,
        ExportRule::Never,
    )
    .with_significant(&["document", "object", "array"])
}

const YAML_RULES: &[NodeRule] = &[NodeRule::new(
    "block_mapping_pair",
    SymbolKind::Variable,
    NameSource::Field("key"),
)
.top_level()];

pub fn yaml() -> LanguageSpec {
    LanguageSpec::new(
        Language::Yaml,
        || tree_sitter_yaml::LANGUAGE.into(),
        YAML_RULES,
        ExportRule::Never,
    )
    .with_significant(&["stream", "document", "block_mapping", "block_sequence"])
}

const TOML_RULES: &[NodeRule] = &[
    NodeRule::new("table", SymbolKind::Variable, NameSource::Hook),
    NodeRule::new("pair", SymbolKind::Variable, NameSource::Hook).top_level(),
];

fn toml_name_hook(node: &Node, code: &str) -> Option<String> {
    match node.kind() {
        // Header text between the brackets: `[server.tls]` -> `server.tls`
        "table" => {
            let first_line = code[node.byte_range()].lines().next()?;
            let inner = first_line.trim().trim_start_matches('[').trim_end_matches(']');
            if inner.is_empty() {
                None
            } else {
                Some(inner.to_string())
            }
        }
        "pair" => {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .find(|c| matches!(c.kind(), "bare_key" | "quoted_key" | "dotted_key"))
                .map(|c| code[c.byte_range()].trim_matches('"').to_string())
        }
        _ => None,
    }
}

pub fn toml() -> LanguageSpec {
    LanguageSpec::new(
        Language::Toml,
        || tree_sitter_toml_ng::LANGUAGE.into(),
        TOML_RULES,
        ExportRule::Never,
    )
    .with_containers(&["table"])
    .with_significant(&["document"])
    .named_by(toml_name_hook)
}
