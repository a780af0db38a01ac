//! Knowledge memory: entities, typed relationships, and the mutating
//! operations the tool surface exposes.
//!
//! Entities are content-addressed (the id is the SHA-256 digest of the
//! canonicalised text). Code-flavoured memories additionally land in the
//! keyword index under a `memory://` path; every memory is embedded into
//! the configured vector collection.

use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, RetrievalResult};
use crate::index::{FileDocument, SymbolIndex};
use crate::parsing::{Language, ParserRegistry};
use crate::retrieve::DocumentSource;
use crate::storage::relational::{EntityRecord, RelationalStore, RelationshipRecord};
use crate::storage::ContentStore;
use crate::vector::{EmbeddedDocument, VectorStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Prefix for keyword-index entries backed by memories, not files.
pub const MEMORY_PATH_PREFIX: &str = "memory://";

/// Byte cap on text sent to the embedding service per memory.
const EMBED_TEXT_CAP: usize = 8_192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Jsonl,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Self::Json),
            "jsonl" => Some(Self::Jsonl),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PruneCriteria {
    /// Entities at or below this authority are candidates.
    pub max_authority: f64,
    /// Only entities last updated before this RFC3339 instant.
    pub updated_before: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneOutcome {
    pub removed: Vec<String>,
    /// Pairs of distinct entities sharing a text digest, surfaced for
    /// the caller to resolve.
    pub conflicts: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStatus {
    pub files: u64,
    pub symbols: u64,
    pub entities: u64,
    pub relationships: u64,
    pub keyword_documents: u64,
    pub collections: Vec<CollectionStatus>,
    pub embedding_service_healthy: bool,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatus {
    pub name: String,
    pub model_id: String,
    pub dimensionality: usize,
    pub vector_count: usize,
}

pub struct KnowledgeService {
    relational: Arc<Mutex<RelationalStore>>,
    index: Arc<SymbolIndex>,
    vectors: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    registry: Arc<ParserRegistry>,
    collection: String,
    model: String,
    backup_dir: PathBuf,
}

impl KnowledgeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        relational: Arc<Mutex<RelationalStore>>,
        index: Arc<SymbolIndex>,
        vectors: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        registry: Arc<ParserRegistry>,
        collection: impl Into<String>,
        model: impl Into<String>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            relational,
            index,
            vectors,
            embedder,
            registry,
            collection: collection.into(),
            model: model.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn relational(&self) -> Arc<Mutex<RelationalStore>> {
        self.relational.clone()
    }

    /// Index one memory item into the keyword index (when it carries
    /// code) and the vector store. Returns the entity id.
    pub async fn store_memory(
        &self,
        text: &str,
        metadata: JsonValue,
    ) -> RetrievalResult<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RetrievalError::invalid("memory text must be non-empty"));
        }
        let digest = ContentStore::digest_text(trimmed);
        let id = digest.clone();
        let now = chrono::Utc::now().to_rfc3339();

        let authority = metadata
            .get("authority")
            .and_then(JsonValue::as_f64)
            .unwrap_or(1.0);
        let entity = EntityRecord {
            id: id.clone(),
            text_digest: digest.clone(),
            content: trimmed.to_string(),
            metadata: metadata.clone(),
            collection: self.collection.clone(),
            authority,
            created_at: now.clone(),
            updated_at: now,
        };
        self.relational.lock().upsert_entity(&entity)?;

        if let Some(language) = self.memory_language(&metadata) {
            if language.is_code() {
                self.index_memory_text(&id, trimmed, language)?;
            }
        }

        self.embed_entity(&id, trimmed, &metadata).await?;
        Ok(id)
    }

    fn memory_language(&self, metadata: &JsonValue) -> Option<Language> {
        metadata
            .get("language")
            .and_then(JsonValue::as_str)
            .and_then(Language::parse_name)
    }

    fn index_memory_text(&self, id: &str, text: &str, language: Language) -> RetrievalResult<()> {
        let parsed = self.registry.parse(language, text);
        let doc = FileDocument {
            path: format!("{MEMORY_PATH_PREFIX}{id}"),
            content: text.to_string(),
            symbols: parsed.symbols.iter().map(|s| s.name.to_string()).collect(),
            defined: parsed
                .symbols
                .iter()
                .filter(|s| s.kind.is_definition())
                .map(|s| s.name.to_string())
                .collect(),
            exports: parsed.exports.clone(),
            imports: parsed.imports.iter().map(|i| i.specifier.to_string()).collect(),
            mtime: chrono::Utc::now().timestamp(),
            file_hash: id.to_string(),
        };
        self.index.replace_file(&doc)?;
        self.index.commit()?;
        Ok(())
    }

    async fn embed_entity(
        &self,
        id: &str,
        text: &str,
        metadata: &JsonValue,
    ) -> RetrievalResult<()> {
        let capped = crate::parsing::parser::truncate_utf8(text, EMBED_TEXT_CAP);
        let vectors = self
            .embedder
            .embed(&[capped.to_string()], &self.model, false)
            .await?;
        let vector = vectors.into_iter().next().ok_or_else(|| {
            RetrievalError::ServiceUnavailable {
                endpoint: "embedding service".to_string(),
                message: "empty embedding batch".to_string(),
            }
        })?;
        self.vectors.insert(
            &self.collection,
            &self.model,
            vec![EmbeddedDocument {
                id: id.to_string(),
                digest: ContentStore::digest_text(text),
                metadata: metadata.clone(),
                vector,
            }],
        )?;
        Ok(())
    }

    /// Insert a typed edge between two existing entities.
    pub fn create_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        kind: &str,
        strength: f64,
    ) -> RetrievalResult<()> {
        if kind.trim().is_empty() {
            return Err(RetrievalError::invalid("relationship kind must be non-empty"));
        }
        if !(0.0..=1.0).contains(&strength) {
            return Err(RetrievalError::invalid("strength must be within [0, 1]"));
        }
        let store = self.relational.lock();
        for id in [from_id, to_id] {
            if store.entity(id)?.is_none() {
                return Err(RetrievalError::invalid(format!("unknown entity '{id}'")));
            }
        }
        store.insert_relationship(&RelationshipRecord {
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            kind: kind.to_string(),
            strength,
        })?;
        Ok(())
    }

    /// Apply a metadata patch. When the patch rewrites the content —
    /// the embed-salient field — the entity is re-embedded.
    pub async fn update_entity(&self, id: &str, patch: JsonValue) -> RetrievalResult<()> {
        let mut entity = self
            .relational
            .lock()
            .entity(id)?
            .ok_or_else(|| RetrievalError::invalid(format!("unknown entity '{id}'")))?;

        let mut content_changed = false;
        if let Some(content) = patch.get("content").and_then(JsonValue::as_str) {
            if content != entity.content {
                entity.content = content.to_string();
                entity.text_digest = ContentStore::digest_text(content);
                content_changed = true;
            }
        }
        if let Some(authority) = patch.get("authority").and_then(JsonValue::as_f64) {
            entity.authority = authority;
        }
        if let Some(metadata) = patch.get("metadata") {
            merge_json(&mut entity.metadata, metadata);
        }
        entity.updated_at = chrono::Utc::now().to_rfc3339();
        self.relational.lock().upsert_entity(&entity)?;

        if content_changed {
            self.embed_entity(id, &entity.content.clone(), &entity.metadata.clone())
                .await?;
            if let Some(language) = self.memory_language(&entity.metadata) {
                if language.is_code() {
                    self.index_memory_text(id, &entity.content, language)?;
                }
            }
        }
        Ok(())
    }

    /// Remove low-authority entries; reports digest conflicts alongside.
    pub fn prune(&self, criteria: &PruneCriteria) -> RetrievalResult<PruneOutcome> {
        let (candidates, conflicts) = {
            let store = self.relational.lock();
            let candidates =
                store.prune_candidates(criteria.max_authority, criteria.updated_before.as_deref())?;
            let conflicts = store.digest_conflicts()?;
            (candidates, conflicts)
        };

        let ids: Vec<String> = candidates.iter().map(|e| e.id.clone()).collect();
        if !ids.is_empty() {
            self.relational.lock().delete_entities(&ids)?;
            self.vectors.remove(&self.collection, &ids)?;
            for id in &ids {
                self.index.remove_file(&format!("{MEMORY_PATH_PREFIX}{id}"))?;
            }
            self.index.commit()?;
        }
        Ok(PruneOutcome {
            removed: ids,
            conflicts,
        })
    }

    /// De-duplicate near-identical vectors; entities whose vectors were
    /// dropped are removed with them.
    pub fn compact(&self) -> RetrievalResult<Vec<String>> {
        let removed = self.vectors.compact(&self.collection)?;
        if !removed.is_empty() {
            self.relational.lock().delete_entities(&removed)?;
            for id in &removed {
                self.index.remove_file(&format!("{MEMORY_PATH_PREFIX}{id}"))?;
            }
            self.index.commit()?;
        }
        Ok(removed)
    }

    /// Streaming dump of entities and relationships.
    pub fn export(
        &self,
        format: ExportFormat,
        include_embeddings: bool,
        out: &mut dyn Write,
    ) -> RetrievalResult<()> {
        let (entities, relationships) = {
            let store = self.relational.lock();
            (store.entities()?, store.relationships()?)
        };

        let embedding_of = |id: &str| -> Option<Vec<f32>> {
            if include_embeddings {
                self.vectors.vector_for(&self.collection, id).ok().flatten()
            } else {
                None
            }
        };

        match format {
            ExportFormat::Json => {
                let entities: Vec<JsonValue> = entities
                    .iter()
                    .map(|e| entity_json(e, embedding_of(&e.id)))
                    .collect();
                let relationships: Vec<JsonValue> =
                    relationships.iter().map(relationship_json).collect();
                let doc = json!({
                    "entities": entities,
                    "relationships": relationships,
                });
                serde_json::to_writer_pretty(&mut *out, &doc)
                    .map_err(|e| RetrievalError::io("export", e))?;
                out.write_all(b"\n").map_err(|e| RetrievalError::io("export", e))?;
            }
            ExportFormat::Jsonl => {
                for entity in &entities {
                    let line = entity_json(entity, embedding_of(&entity.id));
                    serde_json::to_writer(&mut *out, &line)
                        .map_err(|e| RetrievalError::io("export", e))?;
                    out.write_all(b"\n").map_err(|e| RetrievalError::io("export", e))?;
                }
                for edge in &relationships {
                    serde_json::to_writer(&mut *out, &relationship_json(edge))
                        .map_err(|e| RetrievalError::io("export", e))?;
                    out.write_all(b"\n").map_err(|e| RetrievalError::io("export", e))?;
                }
            }
            ExportFormat::Csv => {
                writeln!(out, "id,collection,authority,created_at,updated_at,text_digest")
                    .map_err(|e| RetrievalError::io("export", e))?;
                for entity in &entities {
                    writeln!(
                        out,
                        "{},{},{},{},{},{}",
                        entity.id,
                        entity.collection,
                        entity.authority,
                        entity.created_at,
                        entity.updated_at,
                        entity.text_digest
                    )
                    .map_err(|e| RetrievalError::io("export", e))?;
                }
            }
        }
        Ok(())
    }

    /// Destructive wipe. Refuses without `confirm`; writes a JSONL
    /// backup first unless explicitly skipped.
    pub fn wipe(&self, confirm: bool, skip_backup: bool) -> RetrievalResult<Option<PathBuf>> {
        if !confirm {
            return Err(RetrievalError::invalid(
                "wipe refused: pass confirm=true to destroy the knowledge graph",
            ));
        }

        let backup_path = if skip_backup {
            None
        } else {
            std::fs::create_dir_all(&self.backup_dir)
                .map_err(|e| RetrievalError::io_path(&self.backup_dir, e))?;
            let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
            let path = self.backup_dir.join(format!("knowledge-backup-{stamp}.jsonl"));
            let mut file =
                std::fs::File::create(&path).map_err(|e| RetrievalError::io_path(&path, e))?;
            self.export(ExportFormat::Jsonl, true, &mut file)?;
            Some(path)
        };

        self.relational.lock().wipe()?;
        self.index.clear()?;
        let fingerprint = self.vectors.collection_fingerprint(&self.collection);
        self.vectors.delete_collection(&self.collection)?;
        if let Ok(fingerprint) = fingerprint {
            self.vectors.create_collection(
                &self.collection,
                &fingerprint.model_id,
                fingerprint.dimensionality,
                crate::vector::Similarity::Cosine,
            )?;
        }
        Ok(backup_path)
    }

    /// Re-embed every stored entity into the vector collection.
    pub async fn reindex_entities(&self) -> RetrievalResult<usize> {
        let entities = self.relational.lock().entities()?;
        let mut reindexed = 0;
        for entity in entities {
            self.embed_entity(&entity.id, &entity.content, &entity.metadata)
                .await?;
            if let Some(language) = self.memory_language(&entity.metadata) {
                if language.is_code() {
                    self.index_memory_text(&entity.id, &entity.content, language)?;
                }
            }
            reindexed += 1;
        }
        Ok(reindexed)
    }

    pub fn related(
        &self,
        id: &str,
        limit: usize,
        min_strength: f64,
    ) -> RetrievalResult<Vec<(EntityRecord, RelationshipRecord)>> {
        Ok(self.relational.lock().related_entities(id, limit, min_strength)?)
    }

    pub fn entity(&self, id: &str) -> RetrievalResult<Option<EntityRecord>> {
        Ok(self.relational.lock().entity(id)?)
    }

    pub async fn status(&self) -> RetrievalResult<KnowledgeStatus> {
        let (files, symbols, entities, relationships) = {
            let store = self.relational.lock();
            (
                store.file_count()?,
                store.symbol_count()?,
                store.entity_count()?,
                store.relationship_count()?,
            )
        };

        let mut collections = Vec::new();
        for name in self.vectors.list_collections() {
            if let Ok(fingerprint) = self.vectors.collection_fingerprint(&name) {
                collections.push(CollectionStatus {
                    vector_count: self.vectors.count(&name).unwrap_or(0),
                    name,
                    model_id: fingerprint.model_id,
                    dimensionality: fingerprint.dimensionality,
                });
            }
        }

        Ok(KnowledgeStatus {
            files,
            symbols,
            entities,
            relationships,
            keyword_documents: self.index.doc_count(),
            collections,
            embedding_service_healthy: self.embedder.healthy().await,
            default_model: self.vectors.default_model(),
        })
    }
}

/// Resolves ranked doc ids back to rerankable text: memories from the
/// relational store, files from disk.
pub struct KnowledgeDocumentSource {
    relational: Arc<Mutex<RelationalStore>>,
}

impl KnowledgeDocumentSource {
    pub fn new(relational: Arc<Mutex<RelationalStore>>) -> Self {
        Self { relational }
    }
}

impl DocumentSource for KnowledgeDocumentSource {
    fn text_for(&self, doc_id: &str) -> Option<String> {
        if let Some(id) = doc_id.strip_prefix(MEMORY_PATH_PREFIX) {
            return self
                .relational
                .lock()
                .entity(id)
                .ok()
                .flatten()
                .map(|e| e.content);
        }
        if let Some(entity) = self.relational.lock().entity(doc_id).ok().flatten() {
            return Some(entity.content);
        }
        std::fs::read_to_string(doc_id).ok()
    }
}

fn entity_json(entity: &EntityRecord, embedding: Option<Vec<f32>>) -> JsonValue {
    let mut value = json!({
        "kind": "entity",
        "id": entity.id,
        "text_digest": entity.text_digest,
        "content": entity.content,
        "metadata": entity.metadata,
        "collection": entity.collection,
        "authority": entity.authority,
        "created_at": entity.created_at,
        "updated_at": entity.updated_at,
    });
    if let Some(embedding) = embedding {
        value["embedding"] = json!(embedding);
    }
    value
}

fn relationship_json(edge: &RelationshipRecord) -> JsonValue {
    json!({
        "kind": "relationship",
        "from_id": edge.from_id,
        "to_id": edge.to_id,
        "relation": edge.kind,
        "strength": edge.strength,
    })
}

/// Shallow merge of a JSON object patch; null values delete keys.
fn merge_json(target: &mut JsonValue, patch: &JsonValue) {
    let (Some(target_map), Some(patch_map)) = (target.as_object_mut(), patch.as_object()) else {
        *target = patch.clone();
        return;
    };
    for (key, value) in patch_map {
        if value.is_null() {
            target_map.remove(key);
        } else {
            target_map.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingProvider;
    use crate::vector::Similarity;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        service: KnowledgeService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let relational = Arc::new(Mutex::new(RelationalStore::open_in_memory().unwrap()));
        let index = Arc::new(SymbolIndex::open(&dir.path().join("keyword")).unwrap());
        let vectors = Arc::new(VectorStore::open(dir.path().join("vector")).unwrap());
        vectors
            .create_collection("memories", "gemma3", 32, Similarity::Cosine)
            .unwrap();
        let service = KnowledgeService::new(
            relational,
            index,
            vectors,
            Arc::new(HashEmbeddingProvider::new(32)),
            Arc::new(ParserRegistry::new()),
            "memories",
            "gemma3",
            dir.path().join("backups"),
        );
        Fixture {
            _dir: dir,
            service,
        }
    }

    #[tokio::test]
    async fn store_memory_is_content_addressed() {
        let fixture = fixture();
        let id = fixture
            .service
            .store_memory("retrieval is fused from two channels", json!({}))
            .await
            .unwrap();
        assert_eq!(id.len(), 64);

        // Same text, same id.
        let again = fixture
            .service
            .store_memory("retrieval is fused from two channels", json!({}))
            .await
            .unwrap();
        assert_eq!(id, again);

        let status = fixture.service.status().await.unwrap();
        assert_eq!(status.entities, 1);
        assert_eq!(status.collections[0].vector_count, 1);
    }

    #[tokio::test]
    async fn code_memory_lands_in_keyword_index() {
        let fixture = fixture();
        fixture
            .service
            .store_memory(
                "pub fn fuse_ranks() {}",
                json!({"language": "rust"}),
            )
            .await
            .unwrap();
        let status = fixture.service.status().await.unwrap();
        assert_eq!(status.keyword_documents, 1);
    }

    #[tokio::test]
    async fn relationships_require_existing_entities() {
        let fixture = fixture();
        let a = fixture.service.store_memory("alpha", json!({})).await.unwrap();
        let b = fixture.service.store_memory("beta", json!({})).await.unwrap();

        fixture.service.create_relationship(&a, &b, "refines", 0.8).unwrap();
        let related = fixture.service.related(&a, 10, 0.0).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].0.id, b);

        let err = fixture
            .service
            .create_relationship(&a, "missing", "refines", 0.5)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        let err = fixture
            .service
            .create_relationship(&a, &b, "refines", 1.5)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[tokio::test]
    async fn update_reembeds_when_content_changes() {
        let fixture = fixture();
        let id = fixture.service.store_memory("original text", json!({})).await.unwrap();

        fixture
            .service
            .update_entity(&id, json!({"content": "revised text", "authority": 0.4}))
            .await
            .unwrap();

        let entity = fixture.service.entity(&id).unwrap().unwrap();
        assert_eq!(entity.content, "revised text");
        assert_eq!(entity.authority, 0.4);
        assert_eq!(entity.text_digest, ContentStore::digest_text("revised text"));
    }

    #[tokio::test]
    async fn prune_removes_low_authority_entities() {
        let fixture = fixture();
        let weak = fixture
            .service
            .store_memory("weak memory", json!({"authority": 0.1}))
            .await
            .unwrap();
        fixture
            .service
            .store_memory("strong memory", json!({"authority": 0.9}))
            .await
            .unwrap();

        let outcome = fixture
            .service
            .prune(&PruneCriteria {
                max_authority: 0.5,
                updated_before: None,
            })
            .unwrap();
        assert_eq!(outcome.removed, vec![weak]);

        let status = fixture.service.status().await.unwrap();
        assert_eq!(status.entities, 1);
        assert_eq!(status.collections[0].vector_count, 1);
    }

    #[tokio::test]
    async fn wipe_refuses_without_confirm_and_backs_up() {
        let fixture = fixture();
        fixture.service.store_memory("precious", json!({})).await.unwrap();

        let err = fixture.service.wipe(false, false).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        let backup = fixture.service.wipe(true, false).unwrap().unwrap();
        assert!(backup.exists());
        let contents = std::fs::read_to_string(&backup).unwrap();
        assert!(contents.contains("precious"));

        let status = fixture.service.status().await.unwrap();
        assert_eq!(status.entities, 0);
        assert_eq!(status.keyword_documents, 0);
    }

    #[tokio::test]
    async fn export_formats() {
        let fixture = fixture();
        let a = fixture.service.store_memory("first", json!({})).await.unwrap();
        let b = fixture.service.store_memory("second", json!({})).await.unwrap();
        fixture.service.create_relationship(&a, &b, "follows", 0.5).unwrap();

        let mut json_out = Vec::new();
        fixture
            .service
            .export(ExportFormat::Json, false, &mut json_out)
            .unwrap();
        let parsed: JsonValue = serde_json::from_slice(&json_out).unwrap();
        assert_eq!(parsed["entities"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["relationships"].as_array().unwrap().len(), 1);

        let mut jsonl_out = Vec::new();
        fixture
            .service
            .export(ExportFormat::Jsonl, true, &mut jsonl_out)
            .unwrap();
        let lines: Vec<&str> = std::str::from_utf8(&jsonl_out)
            .unwrap()
            .lines()
            .collect();
        assert_eq!(lines.len(), 3);
        let first: JsonValue = serde_json::from_str(lines[0]).unwrap();
        assert!(first["embedding"].is_array());

        let mut csv_out = Vec::new();
        fixture
            .service
            .export(ExportFormat::Csv, false, &mut csv_out)
            .unwrap();
        let csv = std::str::from_utf8(&csv_out).unwrap();
        assert!(csv.starts_with("id,collection,authority"));
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn merge_json_patches_shallowly() {
        let mut target = json!({"a": 1, "b": 2});
        merge_json(&mut target, &json!({"b": null, "c": 3}));
        assert_eq!(target, json!({"a": 1, "c": 3}));
    }
}
