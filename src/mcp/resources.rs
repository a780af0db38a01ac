//! Read-only resource surface: URI parsing and handlers.
//!
//! Resources are addressed by URI templates over three schemes:
//! `file://` (per-file parse facts), `project://` (tree and summary) and
//! `knowledge://` (search, related entities, health). Handlers return
//! JSON or markdown strings; the transport layer wraps them.

use crate::error::{RetrievalError, RetrievalResult};
use crate::knowledge::KnowledgeService;
use crate::parsing::{CompactOptions, CompactTree, Language, ParsedFile, ParserRegistry};
use crate::retrieve::{HybridRetriever, RetrievalMode, SearchRequest};
use crate::storage::ContentStore;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A parsed resource URI.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRequest {
    FileSymbols { path: PathBuf, positions: bool },
    FileImports(PathBuf),
    FileExports(PathBuf),
    FileStructure(PathBuf),
    FileDiagnostics(PathBuf),
    FileAst { path: PathBuf, options: CompactOptions },
    ProjectStructure {
        path: PathBuf,
        max_depth: Option<usize>,
        exclude: Vec<String>,
    },
    ProjectSummary {
        path: PathBuf,
        include_readme: bool,
        include_package_info: bool,
        include_git_info: bool,
    },
    KnowledgeSearch {
        query: String,
        limit: usize,
        threshold: f32,
        use_bm25: bool,
        use_embeddings: bool,
    },
    KnowledgeRelated {
        id: String,
        limit: usize,
        min_strength: f64,
    },
    KnowledgeStatus,
}

pub fn parse_uri(uri: &str) -> RetrievalResult<ResourceRequest> {
    let (base, query) = match uri.split_once('?') {
        Some((base, query)) => (base, parse_query(query)),
        None => (uri, HashMap::new()),
    };

    if let Some(rest) = base.strip_prefix("file://") {
        return parse_file_uri(rest, &query);
    }
    if let Some(rest) = base.strip_prefix("project://") {
        return parse_project_uri(rest, &query);
    }
    if let Some(rest) = base.strip_prefix("knowledge://") {
        return parse_knowledge_uri(rest, &query);
    }
    Err(RetrievalError::invalid(format!("unsupported resource URI '{uri}'")))
}

fn parse_file_uri(
    rest: &str,
    query: &HashMap<String, String>,
) -> RetrievalResult<ResourceRequest> {
    let (path, verb) = rest
        .rsplit_once('/')
        .ok_or_else(|| RetrievalError::invalid("file URI needs a trailing verb"))?;
    let path = PathBuf::from(path);
    Ok(match verb {
        "symbols" => ResourceRequest::FileSymbols {
            path,
            positions: flag(query, "positions", true),
        },
        "imports" => ResourceRequest::FileImports(path),
        "exports" => ResourceRequest::FileExports(path),
        "structure" => ResourceRequest::FileStructure(path),
        "diagnostics" => ResourceRequest::FileDiagnostics(path),
        "ast" => ResourceRequest::FileAst {
            path,
            options: CompactOptions {
                max_depth: query.get("max_depth").and_then(|v| v.parse().ok()),
                use_symbol_table: flag(query, "use_symbol_table", false),
                include_semantic_hash: flag(query, "include_semantic_hash", false),
                omit_redundant_text: flag(query, "omit_redundant_text", false),
            },
        },
        other => {
            return Err(RetrievalError::invalid(format!("unknown file resource '{other}'")));
        }
    })
}

fn parse_project_uri(
    rest: &str,
    query: &HashMap<String, String>,
) -> RetrievalResult<ResourceRequest> {
    let (path, verb) = rest
        .rsplit_once('/')
        .ok_or_else(|| RetrievalError::invalid("project URI needs a trailing verb"))?;
    let path = PathBuf::from(path);
    Ok(match verb {
        "structure" => ResourceRequest::ProjectStructure {
            path,
            max_depth: query.get("max_depth").and_then(|v| v.parse().ok()),
            exclude: query
                .get("exclude")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        },
        "summary" => ResourceRequest::ProjectSummary {
            path,
            include_readme: flag(query, "include_readme", true),
            include_package_info: flag(query, "include_package_info", true),
            include_git_info: flag(query, "include_git_info", false),
        },
        other => {
            return Err(RetrievalError::invalid(format!(
                "unknown project resource '{other}'"
            )));
        }
    })
}

fn parse_knowledge_uri(
    rest: &str,
    query: &HashMap<String, String>,
) -> RetrievalResult<ResourceRequest> {
    if rest == "status" {
        return Ok(ResourceRequest::KnowledgeStatus);
    }
    if rest == "search" {
        let query_text = query
            .get("query")
            .cloned()
            .ok_or_else(|| RetrievalError::invalid("knowledge search needs ?query="))?;
        return Ok(ResourceRequest::KnowledgeSearch {
            query: query_text,
            limit: query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(10),
            threshold: query.get("threshold").and_then(|v| v.parse().ok()).unwrap_or(0.0),
            use_bm25: flag(query, "use_bm25", true),
            use_embeddings: flag(query, "use_embeddings", true),
        });
    }
    if let Some(inner) = rest.strip_prefix("entity/") {
        if let Some(id) = inner.strip_suffix("/related") {
            return Ok(ResourceRequest::KnowledgeRelated {
                id: id.to_string(),
                limit: query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(10),
                min_strength: query
                    .get("min_strength")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.0),
            });
        }
    }
    Err(RetrievalError::invalid(format!(
        "unknown knowledge resource '{rest}'"
    )))
}

fn flag(query: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match query.get(key).map(String::as_str) {
        None => default,
        Some("") | Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        Some(_) => default,
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = &value[i + 1..i + 3];
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Executes parsed resource requests against the core services.
pub struct ResourceHandler {
    content: Arc<ContentStore>,
    registry: Arc<ParserRegistry>,
    knowledge: Arc<KnowledgeService>,
    retriever: Arc<HybridRetriever>,
    rerank_enabled: bool,
}

impl ResourceHandler {
    pub fn new(
        content: Arc<ContentStore>,
        registry: Arc<ParserRegistry>,
        knowledge: Arc<KnowledgeService>,
        retriever: Arc<HybridRetriever>,
        rerank_enabled: bool,
    ) -> Self {
        Self {
            content,
            registry,
            knowledge,
            retriever,
            rerank_enabled,
        }
    }

    pub async fn handle(&self, uri: &str) -> RetrievalResult<String> {
        let request = parse_uri(uri)?;
        match request {
            ResourceRequest::FileSymbols { path, positions } => {
                let parsed = self.parse_file(&path)?;
                let symbols: Vec<serde_json::Value> = parsed
                    .symbols
                    .iter()
                    .map(|s| {
                        let mut value = json!({
                            "name": s.name,
                            "kind": s.kind.as_str(),
                            "exported": s.exported,
                            "parent": s.parent,
                            "signature": s.signature,
                        });
                        if positions {
                            value["range"] = json!({
                                "start_line": s.range.start_line,
                                "start_column": s.range.start_column,
                                "end_line": s.range.end_line,
                                "end_column": s.range.end_column,
                            });
                        }
                        value
                    })
                    .collect();
                Ok(json!({ "symbols": symbols }).to_string())
            }
            ResourceRequest::FileImports(path) => {
                let parsed = self.parse_file(&path)?;
                let imports: Vec<&str> =
                    parsed.imports.iter().map(|i| i.specifier.as_ref()).collect();
                Ok(json!({ "imports": imports }).to_string())
            }
            ResourceRequest::FileExports(path) => {
                let parsed = self.parse_file(&path)?;
                Ok(json!({ "exports": parsed.exports }).to_string())
            }
            ResourceRequest::FileStructure(path) => {
                let (tree, _) = self.compact_tree(&path, CompactOptions::default())?;
                Ok(tree.to_markdown_outline())
            }
            ResourceRequest::FileDiagnostics(path) => {
                let parsed = self.parse_file(&path)?;
                let diagnostics: Vec<serde_json::Value> = parsed
                    .diagnostics
                    .iter()
                    .map(|d| {
                        json!({
                            "line": d.line,
                            "column": d.column,
                            "message": d.message,
                            "code": "parse_failure",
                        })
                    })
                    .collect();
                Ok(json!({
                    "parse_success": parsed.parse_success,
                    "diagnostics": diagnostics,
                })
                .to_string())
            }
            ResourceRequest::FileAst { path, options } => {
                let (tree, _) = self.compact_tree(&path, options)?;
                Ok(tree.to_json(options).to_string())
            }
            ResourceRequest::ProjectStructure {
                path,
                max_depth,
                exclude,
            } => crate::project::structure(&path, max_depth, &exclude),
            ResourceRequest::ProjectSummary {
                path,
                include_readme,
                include_package_info,
                include_git_info,
            } => {
                let summary = crate::project::summary(
                    &path,
                    include_readme,
                    include_package_info,
                    include_git_info,
                )?;
                serde_json::to_string_pretty(&summary)
                    .map_err(|e| RetrievalError::io("summary", e))
            }
            ResourceRequest::KnowledgeSearch {
                query,
                limit,
                threshold,
                use_bm25,
                use_embeddings,
            } => {
                let mode = match (use_bm25, use_embeddings) {
                    (true, true) if self.rerank_enabled => RetrievalMode::Reranked,
                    (true, true) => RetrievalMode::Hybrid,
                    (true, false) => RetrievalMode::SymbolBm25Only,
                    (false, true) => RetrievalMode::VectorOnly,
                    (false, false) => {
                        return Err(RetrievalError::invalid(
                            "at least one of use_bm25 and use_embeddings must be set",
                        ));
                    }
                };
                let mut request = SearchRequest::new(query, limit.max(1), mode);
                request.threshold = threshold;
                let response = self.retriever.search(request).await?;
                serde_json::to_string_pretty(&response)
                    .map_err(|e| RetrievalError::io("search", e))
            }
            ResourceRequest::KnowledgeRelated {
                id,
                limit,
                min_strength,
            } => {
                let related = self.knowledge.related(&id, limit, min_strength)?;
                let entries: Vec<serde_json::Value> = related
                    .iter()
                    .map(|(entity, edge)| {
                        json!({
                            "id": entity.id,
                            "collection": entity.collection,
                            "authority": entity.authority,
                            "relation": edge.kind,
                            "strength": edge.strength,
                            "preview": crate::parsing::parser::truncate_utf8(&entity.content, 200),
                        })
                    })
                    .collect();
                Ok(json!({ "related": entries }).to_string())
            }
            ResourceRequest::KnowledgeStatus => {
                let status = self.knowledge.status().await?;
                serde_json::to_string_pretty(&status).map_err(|e| RetrievalError::io("status", e))
            }
        }
    }

    fn parse_file(&self, path: &Path) -> RetrievalResult<ParsedFile> {
        let content = self.content.read(path)?;
        match content.text() {
            Some(text) => Ok(self.registry.parse_path(path, text)),
            None => Ok(ParsedFile::empty(Language::Binary, 0)),
        }
    }

    fn compact_tree(
        &self,
        path: &Path,
        options: CompactOptions,
    ) -> RetrievalResult<(CompactTree, Language)> {
        let content = self.content.read(path)?;
        let text = content.text().ok_or_else(|| {
            RetrievalError::invalid(format!("{} is not a text file", path.display()))
        })?;
        let language = Language::from_path(path).ok_or_else(|| {
            RetrievalError::invalid(format!("no language detected for {}", path.display()))
        })?;
        let spec = self
            .registry
            .spec(language)
            .ok_or_else(|| RetrievalError::invalid(format!("no extractor for {language}")))?;
        let tree = CompactTree::build(spec, text, options).ok_or_else(|| {
            RetrievalError::invalid(format!("{language} has no grammar for AST rendering"))
        })?;
        Ok((tree, language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_uris_parse() {
        let request = parse_uri("file:///src/app.ts/symbols").unwrap();
        assert_eq!(
            request,
            ResourceRequest::FileSymbols {
                path: PathBuf::from("/src/app.ts"),
                positions: true
            }
        );

        let request = parse_uri(
            "file:///src/app.ts/ast?use_symbol_table=true&max_depth=3&include_semantic_hash=1",
        )
        .unwrap();
        match request {
            ResourceRequest::FileAst { path, options } => {
                assert_eq!(path, PathBuf::from("/src/app.ts"));
                assert_eq!(options.max_depth, Some(3));
                assert!(options.use_symbol_table);
                assert!(options.include_semantic_hash);
                assert!(!options.omit_redundant_text);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn knowledge_uris_parse() {
        let request =
            parse_uri("knowledge://search?query=token+optimization&limit=5&use_embeddings=false")
                .unwrap();
        match request {
            ResourceRequest::KnowledgeSearch {
                query,
                limit,
                use_bm25,
                use_embeddings,
                ..
            } => {
                assert_eq!(query, "token optimization");
                assert_eq!(limit, 5);
                assert!(use_bm25);
                assert!(!use_embeddings);
            }
            other => panic!("unexpected {other:?}"),
        }

        let request = parse_uri("knowledge://entity/abc123/related?min_strength=0.5").unwrap();
        assert_eq!(
            request,
            ResourceRequest::KnowledgeRelated {
                id: "abc123".to_string(),
                limit: 10,
                min_strength: 0.5
            }
        );

        assert_eq!(parse_uri("knowledge://status").unwrap(), ResourceRequest::KnowledgeStatus);
    }

    #[test]
    fn bad_uris_are_invalid_argument() {
        for uri in [
            "ftp://nope",
            "file:///x.rs/unknown_verb",
            "knowledge://search",
            "knowledge://entity/abc",
        ] {
            let err = parse_uri(uri).unwrap_err();
            assert_eq!(err.code(), "invalid_argument", "{uri}");
        }
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("a%20b+c"), "a b c");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("caf%C3%A9"), "café");
    }
}
