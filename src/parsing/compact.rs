//! Compact tree: a lossy, pruned AST.
//!
//! Node kinds outside a language's significant set collapse into `group`
//! nodes that merely forward their significant children, so consumers
//! see declaration structure without expression noise. The tree can be
//! depth-limited, compressed through a kind symbol table, and annotated
//! with a semantic hash that ignores source positions — equal hashes
//! across files flag structural duplicates.

use crate::parsing::specs::LanguageSpec;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tree_sitter::Node;

pub const GROUP_KIND: &str = "group";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactOptions {
    pub max_depth: Option<usize>,
    pub use_symbol_table: bool,
    pub include_semantic_hash: bool,
    pub omit_redundant_text: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompactNode {
    pub kind: String,
    pub name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub children: Vec<CompactNode>,
}

#[derive(Debug, Clone)]
pub struct CompactTree {
    pub root: CompactNode,
}

impl CompactTree {
    /// Parse and prune in one pass. Returns `None` when the language has
    /// no grammar.
    pub fn build(spec: &LanguageSpec, code: &str, options: CompactOptions) -> Option<Self> {
        let grammar = spec.grammar?;
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&grammar()).ok()?;
        let tree = parser.parse(code, None)?;

        let root_node = tree.root_node();
        let children = collect_significant(spec, root_node, code, 1, options.max_depth);
        let root = CompactNode {
            kind: root_node.kind().to_string(),
            name: None,
            start_line: root_node.start_position().row as u32,
            end_line: root_node.end_position().row as u32,
            children,
        };
        Some(Self { root })
    }

    /// Stable hash over kinds and names in preorder, ignoring positions.
    pub fn semantic_hash(&self) -> String {
        let mut hasher = Sha256::new();
        fold_node(&self.root, &mut hasher);
        let digest = hasher.finalize();
        let mut out = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// JSON rendering honouring the symbol-table and text options.
    pub fn to_json(&self, options: CompactOptions) -> Value {
        let mut table: Vec<String> = Vec::new();
        let root = render(&self.root, &mut table, options);

        let mut out = serde_json::Map::new();
        if options.use_symbol_table {
            out.insert("kinds".to_string(), json!(table));
        }
        out.insert("root".to_string(), root);
        if options.include_semantic_hash {
            out.insert("semantic_hash".to_string(), json!(self.semantic_hash()));
        }
        Value::Object(out)
    }

    /// Markdown outline: one bullet per named node, indented by depth.
    pub fn to_markdown_outline(&self) -> String {
        let mut out = String::new();
        outline(&self.root, 0, &mut out);
        if out.is_empty() {
            out.push_str("(no significant structure)\n");
        }
        out
    }
}

fn collect_significant(
    spec: &LanguageSpec,
    node: Node,
    code: &str,
    depth: usize,
    max_depth: Option<usize>,
) -> Vec<CompactNode> {
    if max_depth.is_some_and(|limit| depth > limit) {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.is_error() || child.is_missing() {
            continue;
        }
        if spec.is_significant(child.kind()) {
            let children = collect_significant(spec, child, code, depth + 1, max_depth);
            out.push(CompactNode {
                kind: child.kind().to_string(),
                name: node_name(&child, code),
                start_line: child.start_position().row as u32,
                end_line: child.end_position().row as u32,
                children,
            });
        } else {
            // Insignificant node: forward its significant descendants.
            // A single forwarded child needs no wrapper; several keep
            // their grouping visible.
            let mut forwarded = collect_significant(spec, child, code, depth, max_depth);
            match forwarded.len() {
                0 => {}
                1 => out.push(forwarded.pop().expect("one element")),
                _ => out.push(CompactNode {
                    kind: GROUP_KIND.to_string(),
                    name: None,
                    start_line: child.start_position().row as u32,
                    end_line: child.end_position().row as u32,
                    children: forwarded,
                }),
            }
        }
    }
    out
}

fn node_name(node: &Node, code: &str) -> Option<String> {
    let name_node = node.child_by_field_name("name")?;
    let text = code[name_node.byte_range()].trim();
    if text.is_empty() || text.len() > 120 {
        None
    } else {
        Some(text.to_string())
    }
}

fn fold_node(node: &CompactNode, hasher: &mut Sha256) {
    hasher.update(node.kind.as_bytes());
    hasher.update([0x1f]);
    if let Some(name) = &node.name {
        hasher.update(name.as_bytes());
    }
    hasher.update([0x1e]);
    for child in &node.children {
        fold_node(child, hasher);
    }
    hasher.update([0x1d]);
}

fn render(node: &CompactNode, table: &mut Vec<String>, options: CompactOptions) -> Value {
    let kind = if options.use_symbol_table {
        let code = match table.iter().position(|k| k == &node.kind) {
            Some(idx) => idx,
            None => {
                table.push(node.kind.clone());
                table.len() - 1
            }
        };
        json!(code)
    } else {
        json!(node.kind)
    };

    let mut out = serde_json::Map::new();
    out.insert("kind".to_string(), kind);
    if let Some(name) = &node.name {
        out.insert("name".to_string(), json!(name));
    }
    if !options.omit_redundant_text {
        out.insert("lines".to_string(), json!([node.start_line, node.end_line]));
    }
    if !node.children.is_empty() {
        let children: Vec<Value> = node
            .children
            .iter()
            .map(|c| render(c, table, options))
            .collect();
        out.insert("children".to_string(), json!(children));
    }
    Value::Object(out)
}

fn outline(node: &CompactNode, depth: usize, out: &mut String) {
    if let Some(name) = &node.name {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&format!(
            "- {} `{}` (line {})\n",
            node.kind.replace('_', " "),
            name,
            node.start_line + 1
        ));
    }
    let child_depth = if node.name.is_some() { depth + 1 } else { depth };
    for child in &node.children {
        outline(child, child_depth, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::Language;
    use crate::parsing::registry::ParserRegistry;

    fn build(code: &str, options: CompactOptions) -> CompactTree {
        let registry = ParserRegistry::new();
        let spec = registry.spec(Language::Rust).unwrap();
        CompactTree::build(spec, code, options).unwrap()
    }

    const CODE: &str = "pub struct Engine;\n\nimpl Engine {\n    pub fn start(&self) {}\n}\n";

    #[test]
    fn significant_nodes_survive_pruning() {
        let tree = build(CODE, CompactOptions::default());
        let kinds: Vec<&str> = tree.root.children.iter().map(|c| c.kind.as_str()).collect();
        assert!(kinds.contains(&"struct_item"));
        assert!(kinds.contains(&"impl_item"));
    }

    #[test]
    fn semantic_hash_ignores_positions() {
        let shifted = format!("\n\n\n{CODE}");
        let a = build(CODE, CompactOptions::default());
        let b = build(&shifted, CompactOptions::default());
        assert_eq!(a.semantic_hash(), b.semantic_hash());

        let c = build("pub struct Other;\n", CompactOptions::default());
        assert_ne!(a.semantic_hash(), c.semantic_hash());
    }

    #[test]
    fn depth_limit_prunes_children() {
        let full = build(CODE, CompactOptions::default());
        let impl_node = full.root.children.iter().find(|c| c.kind == "impl_item").unwrap();
        assert!(!impl_node.children.is_empty());

        let shallow = build(
            CODE,
            CompactOptions {
                max_depth: Some(1),
                ..Default::default()
            },
        );
        let impl_node = shallow.root.children.iter().find(|c| c.kind == "impl_item").unwrap();
        assert!(impl_node.children.is_empty());
    }

    #[test]
    fn symbol_table_replaces_kind_strings() {
        let tree = build(CODE, CompactOptions::default());
        let json = tree.to_json(CompactOptions {
            use_symbol_table: true,
            ..Default::default()
        });
        assert!(json.get("kinds").unwrap().as_array().unwrap().len() > 1);
        assert!(json["root"]["kind"].is_number());

        let plain = tree.to_json(CompactOptions::default());
        assert!(plain.get("kinds").is_none());
        assert!(plain["root"]["kind"].is_string());
    }

    #[test]
    fn outline_lists_named_declarations() {
        let tree = build(CODE, CompactOptions::default());
        let outline = tree.to_markdown_outline();
        assert!(outline.contains("`Engine`"));
        assert!(outline.contains("`start`"));
    }
}
