//! Per-process construction graph.
//!
//! Components are built leaves-first — layout, content store, parser
//! registry, relational store, keyword index, embedding client, vector
//! store, then the retriever and knowledge service on top — with every
//! dependency wired through constructor parameters. The host owns the
//! context's lifetime; there are no process-global singletons.

use crate::config::{EmbeddingConfigFile, Settings};
use crate::embedding::{EmbeddingProvider, HttpEmbeddingClient, model_by_id};
use crate::error::{RetrievalError, RetrievalResult};
use crate::index::SymbolIndex;
use crate::indexing::FilePipeline;
use crate::knowledge::{KnowledgeDocumentSource, KnowledgeService};
use crate::mcp::ResourceHandler;
use crate::parsing::ParserRegistry;
use crate::retrieve::HybridRetriever;
use crate::storage::{ContentStore, RelationalStore, Scope, StorageLayout};
use crate::vector::{Similarity, VectorStore};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Name of the default knowledge collection.
pub const KNOWLEDGE_COLLECTION: &str = "knowledge";

/// Name of the relational database file (without extension).
pub const KNOWLEDGE_DB: &str = "knowledge";

pub struct AppContext {
    pub settings: Settings,
    pub layout: StorageLayout,
    pub scope: Scope,
    pub content: Arc<ContentStore>,
    pub registry: Arc<ParserRegistry>,
    pub relational: Arc<Mutex<RelationalStore>>,
    pub index: Arc<SymbolIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vectors: Arc<VectorStore>,
    pub knowledge: Arc<KnowledgeService>,
    pub retriever: Arc<HybridRetriever>,
    pub pipeline: Arc<FilePipeline>,
    pub resources: Arc<ResourceHandler>,
}

impl AppContext {
    pub fn build(project_root: &Path) -> RetrievalResult<Self> {
        let layout = StorageLayout::new(project_root);
        let scope = layout.scope();
        let base = layout.base_path(scope);
        layout.ensure_dir(&base)?;

        let settings = Settings::load(Some(&base));
        let model_id = settings.embedding.default_model.clone();
        let model = model_by_id(&model_id).ok_or_else(|| {
            RetrievalError::invalid(format!("unknown default embedding model '{model_id}'"))
        })?;

        // Record the effective defaults next to the data so sibling
        // tools can discover them.
        let config_file = EmbeddingConfigFile {
            default_model: model_id.clone(),
            service_url: settings.embedding.service_url.clone(),
        };
        if let Err(e) = config_file.save(&base) {
            tracing::warn!("Could not write {}: {e}", EmbeddingConfigFile::FILE_NAME);
        }

        let content = Arc::new(ContentStore::new());
        let registry = Arc::new(ParserRegistry::new());

        let relational = Arc::new(Mutex::new(
            RelationalStore::open(&layout.relational_path(scope, KNOWLEDGE_DB))
                .map_err(RetrievalError::from)?,
        ));
        let index = Arc::new(SymbolIndex::open(&layout.keyword_index_path(scope))?);

        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(HttpEmbeddingClient::new(&settings.embedding));

        let vectors = Arc::new(VectorStore::open(base.join("vector"))?);
        vectors.create_collection(
            KNOWLEDGE_COLLECTION,
            &model_id,
            model.dimensionality,
            Similarity::Cosine,
        )?;

        let knowledge = Arc::new(KnowledgeService::new(
            relational.clone(),
            index.clone(),
            vectors.clone(),
            embedder.clone(),
            registry.clone(),
            KNOWLEDGE_COLLECTION,
            model_id.clone(),
            base.join("backups"),
        ));

        let retriever = Arc::new(
            HybridRetriever::new(
                index.clone(),
                vectors.clone(),
                embedder.clone(),
                settings.retrieval.clone(),
                KNOWLEDGE_COLLECTION,
                model_id.clone(),
            )
            .with_document_source(Arc::new(KnowledgeDocumentSource::new(relational.clone()))),
        );

        let pipeline = Arc::new(FilePipeline::new(
            content.clone(),
            registry.clone(),
            relational.clone(),
            index.clone(),
            vectors.clone(),
            embedder.clone(),
            settings.indexing.clone(),
            KNOWLEDGE_COLLECTION,
            model_id,
        ));

        let resources = Arc::new(ResourceHandler::new(
            content.clone(),
            registry.clone(),
            knowledge.clone(),
            retriever.clone(),
            settings.retrieval.rerank,
        ));

        Ok(Self {
            settings,
            layout,
            scope,
            content,
            registry,
            relational,
            index,
            embedder,
            vectors,
            knowledge,
            retriever,
            pipeline,
            resources,
        })
    }
}
