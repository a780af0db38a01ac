//! HTML and CSS extraction tables. Markup has no functions or classes in
//! the program sense; elements with an `id` and CSS rule sets surface as
//! variables so they remain findable, and script/link/`@import`
//! references become import edges.

use super::{ExportRule, ImportRule, ImportSource, LanguageSpec, NameSource, NodeRule};
use crate::parsing::Language;
use crate::parsing::parser::strip_specifier_quotes;
use crate::types::SymbolKind;
use tree_sitter::Node;

const HTML_RULES: &[NodeRule] = &[NodeRule::new(
    "element",
    SymbolKind::Variable,
    NameSource::Hook,
)];

const HTML_IMPORTS: &[ImportRule] = &[
    ImportRule::new("script_element", ImportSource::Hook),
    ImportRule::new("element", ImportSource::Hook),
];

/// Attribute value lookup inside a start tag.
fn attribute_value(node: &Node, code: &str, wanted: &str) -> Option<String> {
    let mut tag_cursor = node.walk();
    let start_tag = node
        .children(&mut tag_cursor)
        .find(|c| c.kind() == "start_tag" || c.kind() == "self_closing_tag")?;
    let mut cursor = start_tag.walk();
    for child in start_tag.children(&mut cursor) {
        if child.kind() != "attribute" {
            continue;
        }
        let mut attr_cursor = child.walk();
        let mut name = None;
        let mut value = None;
        for part in child.children(&mut attr_cursor) {
            match part.kind() {
                "attribute_name" => name = Some(&code[part.byte_range()]),
                "attribute_value" => value = Some(code[part.byte_range()].to_string()),
                "quoted_attribute_value" => {
                    value = Some(strip_specifier_quotes(&code[part.byte_range()]).to_string())
                }
                _ => {}
            }
        }
        if name == Some(wanted) {
            return value;
        }
    }
    None
}

fn tag_name(node: &Node, code: &str) -> Option<String> {
    let mut cursor = node.walk();
    let start_tag = node
        .children(&mut cursor)
        .find(|c| c.kind() == "start_tag" || c.kind() == "self_closing_tag")?;
    let mut inner = start_tag.walk();
    start_tag
        .children(&mut inner)
        .find(|c| c.kind() == "tag_name")
        .map(|c| code[c.byte_range()].to_string())
}

fn html_name_hook(node: &Node, code: &str) -> Option<String> {
    attribute_value(node, code, "id")
}

fn html_import_hook(node: &Node, code: &str) -> Option<String> {
    match node.kind() {
        "script_element" => attribute_value(node, code, "src"),
        "element" => {
            let tag = tag_name(node, code)?;
            if tag == "link" {
                attribute_value(node, code, "href")
            } else {
                None
            }
        }
        _ => None,
    }
}

pub fn html() -> LanguageSpec {
    LanguageSpec::new(
        Language::Html,
        || tree_sitter_html::LANGUAGE.into(),
        HTML_RULES,
        ExportRule::Never,
    )
    .with_imports(HTML_IMPORTS)
    .with_significant(&["document", "script_element", "style_element"])
    .named_by(html_name_hook)
    .imported_by(html_import_hook)
}

const CSS_RULES: &[NodeRule] = &[NodeRule::new(
    "rule_set",
    SymbolKind::Variable,
    NameSource::ChildKind("selectors"),
)];

const CSS_IMPORTS: &[ImportRule] = &[ImportRule::new("import_statement", ImportSource::Hook)];

fn css_import_hook(node: &Node, code: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "string_value" => {
                return Some(strip_specifier_quotes(&code[child.byte_range()]).to_string());
            }
            "call_expression" => {
                let text = &code[child.byte_range()];
                let inner = text
                    .strip_prefix("url(")
                    .and_then(|t| t.strip_suffix(')'))
                    .unwrap_or(text);
                return Some(strip_specifier_quotes(inner).to_string());
            }
            _ => {}
        }
    }
    None
}

pub fn css() -> LanguageSpec {
    LanguageSpec::new(
        Language::Css,
        || tree_sitter_css::LANGUAGE.into(),
        CSS_RULES,
        ExportRule::Never,
    )
    .with_imports(CSS_IMPORTS)
    .with_significant(&["stylesheet", "media_statement", "keyframes_statement"])
    .imported_by(css_import_hook)
}
