//! MCP server: the JSON-RPC tool/resource surface over the retrieval
//! core.
//!
//! Resources are read-only and URI-addressed (`file://`, `project://`,
//! `knowledge://`); tools mutate the knowledge graph and the indexes.
//! The server runs on the stdio transport; diagnostics go to stderr via
//! tracing, never stdout.

pub mod resources;

use crate::error::RetrievalError;
use crate::indexing::FilePipeline;
use crate::knowledge::{ExportFormat, KnowledgeService, PruneCriteria};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorData as McpError, Implementation, InitializeRequestParam,
        InitializeResult, ProtocolVersion, ReadResourceRequestParam, ReadResourceResult,
        ResourceContents, ServerCapabilities, ServerInfo,
    },
    schemars,
    service::{RequestContext, RoleServer},
    tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub use resources::{ResourceHandler, ResourceRequest, parse_uri};

fn tool_error(err: RetrievalError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("{}: {err}", err.code()))])
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct StoreMemoryRequest {
    /// Text of the memory item to index
    pub text: String,
    /// Free-form metadata; `language` marks code memories,
    /// `authority` weighs pruning
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct CreateRelationshipRequest {
    pub from_id: String,
    pub to_id: String,
    /// Edge kind (e.g. "refines", "contradicts", "follows")
    pub kind: String,
    /// Edge strength within [0, 1] (default: 1.0)
    #[serde(default = "default_strength")]
    pub strength: f64,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct UpdateEntityRequest {
    pub id: String,
    /// Patch object; `content` re-embeds, `authority` and `metadata`
    /// update in place
    pub patch: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PruneMemoryRequest {
    /// Entities at or below this authority are removed (default: 0.2)
    #[serde(default = "default_prune_authority")]
    pub max_authority: f64,
    /// Only prune entities last updated before this RFC3339 instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_before: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct CompactMemoryRequest {}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ExportGraphRequest {
    /// One of "json", "jsonl", "csv"
    pub format: String,
    /// Include embedding vectors in the dump (default: false)
    #[serde(default)]
    pub include_embeddings: bool,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct WipeGraphRequest {
    /// Must be true; the wipe is destructive
    #[serde(default)]
    pub confirm: bool,
    /// Skip the automatic JSONL backup (default: false)
    #[serde(default)]
    pub skip_backup: bool,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ReindexRequest {
    /// "entities" re-embeds stored memories; "files" streams the file
    /// pipeline over `paths`
    pub mode: String,
    /// Roots for file mode
    #[serde(default)]
    pub paths: Vec<String>,
}

fn default_strength() -> f64 {
    1.0
}

fn default_prune_authority() -> f64 {
    0.2
}

#[derive(Clone)]
pub struct RetrievalServer {
    knowledge: Arc<KnowledgeService>,
    pipeline: Arc<FilePipeline>,
    resources: Arc<ResourceHandler>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RetrievalServer {
    pub fn new(
        knowledge: Arc<KnowledgeService>,
        pipeline: Arc<FilePipeline>,
        resources: Arc<ResourceHandler>,
    ) -> Self {
        Self {
            knowledge,
            pipeline,
            resources,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Index one memory item into the knowledge base (keyword index for code, vectors for everything). Returns the content-addressed entity id.")]
    pub async fn store_knowledge_memory(
        &self,
        Parameters(StoreMemoryRequest { text, metadata }): Parameters<StoreMemoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.knowledge.store_memory(&text, metadata).await {
            Ok(id) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Stored entity {id}"
            ))])),
            Err(err) => Ok(tool_error(err)),
        }
    }

    #[tool(description = "Insert a typed, weighted edge between two knowledge entities.")]
    pub async fn create_knowledge_relationship(
        &self,
        Parameters(CreateRelationshipRequest {
            from_id,
            to_id,
            kind,
            strength,
        }): Parameters<CreateRelationshipRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .knowledge
            .create_relationship(&from_id, &to_id, &kind, strength)
        {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Linked {from_id} -[{kind} {strength:.2}]-> {to_id}"
            ))])),
            Err(err) => Ok(tool_error(err)),
        }
    }

    #[tool(description = "Patch a knowledge entity. Changing its content re-embeds it.")]
    pub async fn update_knowledge_entity(
        &self,
        Parameters(UpdateEntityRequest { id, patch }): Parameters<UpdateEntityRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.knowledge.update_entity(&id, patch).await {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Updated entity {id}"
            ))])),
            Err(err) => Ok(tool_error(err)),
        }
    }

    #[tool(description = "Remove low-authority knowledge entries. Returns removed ids and digest-conflict pairs for review.")]
    pub async fn prune_knowledge_memory(
        &self,
        Parameters(PruneMemoryRequest {
            max_authority,
            updated_before,
        }): Parameters<PruneMemoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let criteria = PruneCriteria {
            max_authority,
            updated_before,
        };
        match self.knowledge.prune(&criteria) {
            Ok(outcome) => {
                let body = serde_json::to_string_pretty(&outcome)
                    .unwrap_or_else(|_| "{}".to_string());
                Ok(CallToolResult::success(vec![Content::text(body)]))
            }
            Err(err) => Ok(tool_error(err)),
        }
    }

    #[tool(description = "De-duplicate near-identical vectors in the knowledge collection.")]
    pub async fn compact_knowledge_memory(
        &self,
        Parameters(CompactMemoryRequest {}): Parameters<CompactMemoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.knowledge.compact() {
            Ok(removed) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Removed {} near-duplicate entr{}: {}",
                removed.len(),
                if removed.len() == 1 { "y" } else { "ies" },
                removed.join(", ")
            ))])),
            Err(err) => Ok(tool_error(err)),
        }
    }

    #[tool(description = "Dump the knowledge graph as json, jsonl or csv, optionally with embedding vectors.")]
    pub async fn export_knowledge_graph(
        &self,
        Parameters(ExportGraphRequest {
            format,
            include_embeddings,
        }): Parameters<ExportGraphRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(format) = ExportFormat::parse(&format) else {
            return Ok(tool_error(RetrievalError::invalid(format!(
                "unknown export format '{format}'"
            ))));
        };
        let mut buffer = Vec::new();
        match self.knowledge.export(format, include_embeddings, &mut buffer) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(
                String::from_utf8_lossy(&buffer).into_owned(),
            )])),
            Err(err) => Ok(tool_error(err)),
        }
    }

    #[tool(description = "Destroy the knowledge graph. Refuses without confirm=true; writes a JSONL backup first unless skip_backup is set.")]
    pub async fn wipe_knowledge_graph(
        &self,
        Parameters(WipeGraphRequest {
            confirm,
            skip_backup,
        }): Parameters<WipeGraphRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.knowledge.wipe(confirm, skip_backup) {
            Ok(backup) => {
                let message = match backup {
                    Some(path) => format!("Knowledge graph wiped; backup at {}", path.display()),
                    None => "Knowledge graph wiped; backup skipped".to_string(),
                };
                Ok(CallToolResult::success(vec![Content::text(message)]))
            }
            Err(err) => Ok(tool_error(err)),
        }
    }

    #[tool(description = "Bulk reindex: mode \"entities\" re-embeds stored memories, mode \"files\" streams the given paths through the full pipeline.")]
    pub async fn reindex_knowledge_base(
        &self,
        Parameters(ReindexRequest { mode, paths }): Parameters<ReindexRequest>,
    ) -> Result<CallToolResult, McpError> {
        match mode.as_str() {
            "entities" => match self.knowledge.reindex_entities().await {
                Ok(count) => Ok(CallToolResult::success(vec![Content::text(format!(
                    "Re-embedded {count} entities"
                ))])),
                Err(err) => Ok(tool_error(err)),
            },
            "files" => {
                if paths.is_empty() {
                    return Ok(tool_error(RetrievalError::invalid(
                        "file mode needs at least one path",
                    )));
                }
                let roots: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
                match self.pipeline.index_paths(&roots).await {
                    Ok(stats) => Ok(CallToolResult::success(vec![Content::text(format!(
                        "Indexed {} files ({} symbols, {} embedded, {} failed, {} tombstoned)",
                        stats.files_indexed,
                        stats.symbols,
                        stats.embedded,
                        stats.files_failed,
                        stats.files_tombstoned
                    ))])),
                    Err(err) => Ok(tool_error(err)),
                }
            }
            other => Ok(tool_error(RetrievalError::invalid(format!(
                "unknown reindex mode '{other}'"
            )))),
        }
    }
}

#[tool_handler]
impl ServerHandler for RetrievalServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "lodestone".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Lodestone Retrieval Engine".to_string()),
                website_url: None,
                icons: None,
            },
            instructions: Some(
                "Hybrid code-and-knowledge retrieval. \
                Read resources: file://{path}/symbols|imports|exports|structure|diagnostics|ast, \
                project://{path}/structure|summary, \
                knowledge://search?query=..., knowledge://entity/{id}/related, knowledge://status. \
                Use store_knowledge_memory to save findings and reindex_knowledge_base after large file changes."
                    .to_string(),
            ),
        }
    }

    async fn initialize(
        &self,
        request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        if context.peer.peer_info().is_none() {
            context.peer.set_peer_info(request);
        }
        Ok(self.get_info())
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        match self.resources.handle(&request.uri).await {
            Ok(body) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(body, request.uri)],
            }),
            Err(err) => Err(McpError::invalid_params(
                format!("{}: {err}", err.code()),
                None,
            )),
        }
    }
}
