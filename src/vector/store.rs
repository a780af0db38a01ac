//! Persistent vector collections with nearest-neighbour search.
//!
//! Layout per collection under `<base>/vector/<name>/`:
//!
//! - `vectors.bin` — header + f32 little-endian payload, memory-mapped
//!   on load
//! - `documents.json` — ids, source digests, metadata, insert times
//! - `<name>.metadata.json` — fingerprint sidecar (see `collection`)
//!
//! One writer per collection (write lock held for the whole batch),
//! readers share a read lock. Inserts validate every vector against the
//! fingerprint before anything is written: a failed batch leaves no
//! partial state.

use crate::error::{RetrievalError, RetrievalResult};
use crate::vector::collection::{CollectionMetadata, Fingerprint, Similarity};
use dashmap::DashMap;
use memmap2::Mmap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAGIC: &[u8; 4] = b"LSVC";
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Default cool-down between default-model switches.
pub const MODEL_SWITCH_COOLDOWN_HOURS: i64 = 24;

/// Near-duplicate similarity floor used by `compact`.
const COMPACT_DUPLICATE_SIMILARITY: f32 = 0.98;

/// A document queued for insertion.
#[derive(Debug, Clone)]
pub struct EmbeddedDocument {
    pub id: String,
    pub digest: String,
    pub metadata: JsonValue,
    pub vector: Vec<f32>,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub doc_id: String,
    pub similarity: f32,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocEntry {
    id: String,
    digest: String,
    metadata: JsonValue,
    inserted_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DefaultModelState {
    model_id: String,
    switched_at: String,
}

struct Collection {
    metadata: CollectionMetadata,
    dir: PathBuf,
    docs: Vec<DocEntry>,
    /// Flat row-major vectors, `docs.len() * dimensionality` floats.
    vectors: Vec<f32>,
}

pub struct VectorStore {
    base: PathBuf,
    collections: DashMap<String, Arc<RwLock<Collection>>>,
    default_model: Mutex<Option<DefaultModelState>>,
}

impl VectorStore {
    pub fn open(base: impl Into<PathBuf>) -> RetrievalResult<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base).map_err(|e| RetrievalError::io_path(&base, e))?;
        let default_model = Self::load_default_model(&base);
        Ok(Self {
            base,
            collections: DashMap::new(),
            default_model: Mutex::new(default_model),
        })
    }

    fn load_default_model(base: &Path) -> Option<DefaultModelState> {
        let raw = std::fs::read_to_string(base.join("default_model.json")).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn collection_dir(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }

    /// Create a collection with an explicit model fingerprint. Opening
    /// an existing collection revalidates the fingerprint instead.
    pub fn create_collection(
        &self,
        name: &str,
        model_id: &str,
        dimensionality: usize,
        similarity: Similarity,
    ) -> RetrievalResult<()> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(RetrievalError::invalid(format!(
                "invalid collection name '{name}'"
            )));
        }
        let dir = self.collection_dir(name);
        std::fs::create_dir_all(&dir).map_err(|e| RetrievalError::io_path(&dir, e))?;

        if let Some(existing) = CollectionMetadata::load(&dir, name)? {
            existing.check_compatible(model_id, dimensionality)?;
            return Ok(());
        }

        let metadata = CollectionMetadata::new(
            name,
            Fingerprint::new(model_id, dimensionality),
            similarity,
        );
        metadata.save(&dir)?;
        Ok(())
    }

    /// Open a collection, revalidating its fingerprint against the
    /// caller's expected model.
    fn open_collection(
        &self,
        name: &str,
        expected_model: Option<&str>,
    ) -> RetrievalResult<Arc<RwLock<Collection>>> {
        if let Some(entry) = self.collections.get(name) {
            let handle = entry.clone();
            if let Some(model) = expected_model {
                handle.read().metadata.check_model(model)?;
            }
            return Ok(handle);
        }

        let dir = self.collection_dir(name);
        let metadata = CollectionMetadata::load(&dir, name)?.ok_or_else(|| {
            RetrievalError::invalid(format!("collection '{name}' does not exist"))
        })?;
        if let Some(model) = expected_model {
            metadata.check_model(model)?;
        }

        let docs = Self::load_docs(&dir)?;
        let vectors = Self::load_vectors(&dir, metadata.fingerprint.dimensionality, docs.len())?;

        let collection = Arc::new(RwLock::new(Collection {
            metadata,
            dir,
            docs,
            vectors,
        }));
        self.collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    fn load_docs(dir: &Path) -> RetrievalResult<Vec<DocEntry>> {
        let path = dir.join("documents.json");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| RetrievalError::io_path(&path, e))?;
        serde_json::from_str(&raw).map_err(|e| RetrievalError::io_path(&path, e))
    }

    fn load_vectors(dir: &Path, dimensionality: usize, expected_count: usize) -> RetrievalResult<Vec<f32>> {
        let path = dir.join("vectors.bin");
        if !path.exists() {
            if expected_count != 0 {
                return Err(RetrievalError::io_path(
                    &path,
                    "vector payload missing for non-empty collection",
                ));
            }
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&path).map_err(|e| RetrievalError::io_path(&path, e))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| RetrievalError::io_path(&path, e))?;
        let bytes: &[u8] = &mmap;

        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return Err(RetrievalError::io_path(&path, "corrupt vector payload header"));
        }
        let dim = u32::from_le_bytes(bytes[8..12].try_into().expect("4 bytes")) as usize;
        let count = u64::from_le_bytes(bytes[12..20].try_into().expect("8 bytes")) as usize;
        if dim != dimensionality || count != expected_count {
            return Err(RetrievalError::io_path(
                &path,
                format!("vector payload disagrees with sidecar (dim {dim}, count {count})"),
            ));
        }
        let expected_bytes = HEADER_LEN + count * dim * 4;
        if bytes.len() < expected_bytes {
            return Err(RetrievalError::io_path(&path, "truncated vector payload"));
        }

        let mut vectors = Vec::with_capacity(count * dim);
        for chunk in bytes[HEADER_LEN..expected_bytes].chunks_exact(4) {
            vectors.push(f32::from_le_bytes(chunk.try_into().expect("4 bytes")));
        }
        Ok(vectors)
    }

    fn persist(collection: &Collection) -> RetrievalResult<()> {
        let dim = collection.metadata.fingerprint.dimensionality;
        let count = collection.docs.len();

        let bin_path = collection.dir.join("vectors.bin");
        let mut payload = Vec::with_capacity(HEADER_LEN + collection.vectors.len() * 4);
        payload.extend_from_slice(MAGIC);
        payload.extend_from_slice(&crate::vector::collection::SCHEMA_VERSION.to_le_bytes());
        payload.extend_from_slice(&(dim as u32).to_le_bytes());
        payload.extend_from_slice(&(count as u64).to_le_bytes());
        for value in &collection.vectors {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        let tmp = bin_path.with_extension("bin.tmp");
        std::fs::write(&tmp, payload).map_err(|e| RetrievalError::io_path(&tmp, e))?;
        std::fs::rename(&tmp, &bin_path).map_err(|e| RetrievalError::io_path(&bin_path, e))?;

        let docs_path = collection.dir.join("documents.json");
        let json = serde_json::to_string(&collection.docs).expect("docs serialise");
        let tmp = docs_path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| RetrievalError::io_path(&tmp, e))?;
        std::fs::rename(&tmp, &docs_path).map_err(|e| RetrievalError::io_path(&docs_path, e))?;

        let mut metadata = collection.metadata.clone();
        metadata.vector_count = count;
        metadata.save(&collection.dir)?;
        Ok(())
    }

    /// Insert a batch produced by `model_id`. Validation happens before
    /// any mutation: on failure the collection is untouched.
    pub fn insert(
        &self,
        name: &str,
        model_id: &str,
        documents: Vec<EmbeddedDocument>,
    ) -> RetrievalResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let handle = self.open_collection(name, Some(model_id))?;
        let mut collection = handle.write();

        let dim = collection.metadata.fingerprint.dimensionality;
        for doc in &documents {
            if doc.vector.len() != dim {
                return Err(RetrievalError::DimensionMismatch {
                    model: model_id.to_string(),
                    expected: dim,
                    actual: doc.vector.len(),
                });
            }
        }

        let inserted_at = chrono::Utc::now().to_rfc3339();
        let mut inserted = 0;
        for doc in documents {
            if let Some(pos) = collection.docs.iter().position(|d| d.id == doc.id) {
                // Replace in place: same id means a re-embedding.
                let start = pos * dim;
                collection.vectors[start..start + dim].copy_from_slice(&doc.vector);
                collection.docs[pos] = DocEntry {
                    id: doc.id,
                    digest: doc.digest,
                    metadata: doc.metadata,
                    inserted_at: inserted_at.clone(),
                };
            } else {
                collection.vectors.extend_from_slice(&doc.vector);
                collection.docs.push(DocEntry {
                    id: doc.id,
                    digest: doc.digest,
                    metadata: doc.metadata,
                    inserted_at: inserted_at.clone(),
                });
            }
            inserted += 1;
        }

        collection.metadata.vector_count = collection.docs.len();
        Self::persist(&collection)?;
        Ok(inserted)
    }

    /// Nearest neighbours by the collection's similarity function.
    /// `threshold` is a lower cut; 0.0 disables it.
    pub fn search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> RetrievalResult<Vec<VectorHit>> {
        let handle = self.open_collection(name, None)?;
        let collection = handle.read();
        let dim = collection.metadata.fingerprint.dimensionality;
        if query.len() != dim {
            return Err(RetrievalError::DimensionMismatch {
                model: collection.metadata.fingerprint.model_id.clone(),
                expected: dim,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<VectorHit> = collection
            .docs
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let row = &collection.vectors[i * dim..(i + 1) * dim];
                let similarity = match collection.metadata.similarity {
                    Similarity::Cosine => cosine_similarity(query, row),
                    Similarity::Dot => dot_product(query, row),
                };
                VectorHit {
                    doc_id: doc.id.clone(),
                    similarity,
                    metadata: doc.metadata.clone(),
                }
            })
            .filter(|hit| threshold <= 0.0 || hit.similarity >= threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    pub fn remove(&self, name: &str, ids: &[String]) -> RetrievalResult<usize> {
        let handle = self.open_collection(name, None)?;
        let mut collection = handle.write();
        let dim = collection.metadata.fingerprint.dimensionality;

        let mut removed = 0;
        let mut keep_docs = Vec::with_capacity(collection.docs.len());
        let mut keep_vectors = Vec::with_capacity(collection.vectors.len());
        for (i, doc) in collection.docs.iter().enumerate() {
            if ids.contains(&doc.id) {
                removed += 1;
            } else {
                keep_docs.push(doc.clone());
                keep_vectors.extend_from_slice(&collection.vectors[i * dim..(i + 1) * dim]);
            }
        }
        collection.docs = keep_docs;
        collection.vectors = keep_vectors;
        collection.metadata.vector_count = collection.docs.len();
        Self::persist(&collection)?;
        Ok(removed)
    }

    /// De-duplicate near-identical vectors, keeping the earliest insert.
    /// Returns the removed document ids.
    pub fn compact(&self, name: &str) -> RetrievalResult<Vec<String>> {
        let duplicates = {
            let handle = self.open_collection(name, None)?;
            let collection = handle.read();
            let dim = collection.metadata.fingerprint.dimensionality;
            let mut duplicates = Vec::new();
            for i in 0..collection.docs.len() {
                let row_i = &collection.vectors[i * dim..(i + 1) * dim];
                for j in (i + 1)..collection.docs.len() {
                    if duplicates.contains(&collection.docs[j].id) {
                        continue;
                    }
                    let row_j = &collection.vectors[j * dim..(j + 1) * dim];
                    if cosine_similarity(row_i, row_j) >= COMPACT_DUPLICATE_SIMILARITY {
                        duplicates.push(collection.docs[j].id.clone());
                    }
                }
            }
            duplicates
        };

        if !duplicates.is_empty() {
            self.remove(name, &duplicates)?;
        }
        Ok(duplicates)
    }

    /// Freeze (or unfreeze) a collection's model. Locked collections
    /// block default-model switches even when forced.
    pub fn set_locked(&self, name: &str, locked: bool) -> RetrievalResult<()> {
        let handle = self.open_collection(name, None)?;
        let mut collection = handle.write();
        collection.metadata.locked = locked;
        Self::persist(&collection)?;
        Ok(())
    }

    /// The stored vector for one document id, if present.
    pub fn vector_for(&self, name: &str, doc_id: &str) -> RetrievalResult<Option<Vec<f32>>> {
        let handle = self.open_collection(name, None)?;
        let collection = handle.read();
        let dim = collection.metadata.fingerprint.dimensionality;
        let found = collection
            .docs
            .iter()
            .position(|d| d.id == doc_id)
            .map(|i| collection.vectors[i * dim..(i + 1) * dim].to_vec());
        Ok(found)
    }

    pub fn count(&self, name: &str) -> RetrievalResult<usize> {
        let handle = self.open_collection(name, None)?;
        let count = handle.read().docs.len();
        Ok(count)
    }

    pub fn collection_fingerprint(&self, name: &str) -> RetrievalResult<Fingerprint> {
        let handle = self.open_collection(name, None)?;
        let fingerprint = handle.read().metadata.fingerprint.clone();
        Ok(fingerprint)
    }

    /// Names of collections present on disk.
    pub fn list_collections(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.base) {
            for entry in entries.flatten() {
                if entry.path().is_dir() {
                    if let Some(name) = entry.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        names
    }

    pub fn delete_collection(&self, name: &str) -> RetrievalResult<()> {
        self.collections.remove(name);
        let dir = self.collection_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| RetrievalError::io_path(&dir, e))?;
        }
        Ok(())
    }

    pub fn default_model(&self) -> Option<String> {
        self.default_model.lock().as_ref().map(|s| s.model_id.clone())
    }

    /// Switch the default model for new collections. Refuses when any
    /// collection holds vectors unless forced, and enforces a cool-down
    /// window against repeated re-index thrash.
    pub fn switch_default_model(&self, model_id: &str, force: bool) -> RetrievalResult<()> {
        let mut state = self.default_model.lock();

        if let Some(current) = state.as_ref() {
            if current.model_id == model_id {
                return Ok(());
            }
            // The cool-down holds regardless of `force`: force waives the
            // non-empty-collection guard below, not the thrash window.
            if let Ok(switched_at) = chrono::DateTime::parse_from_rfc3339(&current.switched_at) {
                let elapsed = chrono::Utc::now().signed_duration_since(switched_at);
                if elapsed < chrono::Duration::hours(MODEL_SWITCH_COOLDOWN_HOURS) {
                    return Err(RetrievalError::invalid(format!(
                        "default model switched {}h ago; cool-down is {}h",
                        elapsed.num_hours(),
                        MODEL_SWITCH_COOLDOWN_HOURS
                    )));
                }
            }
        }

        for name in self.list_collections() {
            let handle = self.open_collection(&name, None)?;
            let collection = handle.read();
            if collection.metadata.locked {
                return Err(RetrievalError::Conflict {
                    resource: name,
                    message: "collection is locked to its model".to_string(),
                });
            }
            if !force && !collection.docs.is_empty() {
                return Err(RetrievalError::Conflict {
                    resource: name,
                    message: "collection holds vectors; pass force to switch the default model"
                        .to_string(),
                });
            }
        }

        let new_state = DefaultModelState {
            model_id: model_id.to_string(),
            switched_at: chrono::Utc::now().to_rfc3339(),
        };
        let path = self.base.join("default_model.json");
        let json = serde_json::to_string_pretty(&new_state).expect("state serialises");
        std::fs::write(&path, json).map_err(|e| RetrievalError::io_path(&path, e))?;
        *state = Some(new_state);
        Ok(())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(id: &str, vector: Vec<f32>) -> EmbeddedDocument {
        EmbeddedDocument {
            id: id.to_string(),
            digest: format!("digest-{id}"),
            metadata: json!({"id": id}),
            vector,
        }
    }

    fn store_with(dir: &TempDir) -> VectorStore {
        let store = VectorStore::open(dir.path()).unwrap();
        store
            .create_collection("docs", "gemma3", 4, Similarity::Cosine)
            .unwrap();
        store
    }

    #[test]
    fn insert_search_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);

        store
            .insert(
                "docs",
                "gemma3",
                vec![
                    doc("a", vec![1.0, 0.0, 0.0, 0.0]),
                    doc("b", vec![0.0, 1.0, 0.0, 0.0]),
                    doc("c", vec![0.9, 0.1, 0.0, 0.0]),
                ],
            )
            .unwrap();

        let hits = store.search("docs", &[1.0, 0.0, 0.0, 0.0], 2, 0.0).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, "a");
        assert_eq!(hits[1].doc_id, "c");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn wrong_model_write_fails_with_no_partial_state() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);
        store
            .insert("docs", "gemma3", vec![doc("a", vec![1.0, 0.0, 0.0, 0.0])])
            .unwrap();

        let err = store
            .insert("docs", "qwen3", vec![doc("b", vec![0.0; 4])])
            .unwrap_err();
        assert_eq!(err.code(), "collection_incompatible");
        assert_eq!(store.count("docs").unwrap(), 1);
    }

    #[test]
    fn wrong_dimension_batch_is_rejected_whole() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);

        let err = store
            .insert(
                "docs",
                "gemma3",
                vec![
                    // First vector matches the fingerprint, second does
                    // not: nothing may land.
                    doc("good", vec![1.0, 0.0, 0.0, 0.0]),
                    doc("bad", vec![1.0, 0.0]),
                ],
            )
            .unwrap_err();
        assert_eq!(err.code(), "dimension_mismatch");
        assert_eq!(store.count("docs").unwrap(), 0);
    }

    #[test]
    fn reopen_revalidates_fingerprint_from_disk() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_with(&dir);
            store
                .insert("docs", "gemma3", vec![doc("a", vec![0.5, 0.5, 0.0, 0.0])])
                .unwrap();
        }
        // Fresh handle, state reloaded from disk.
        let store = VectorStore::open(dir.path()).unwrap();
        assert_eq!(store.count("docs").unwrap(), 1);
        let err = store
            .insert("docs", "qwen3", vec![doc("x", vec![0.0; 4])])
            .unwrap_err();
        assert_eq!(err.code(), "collection_incompatible");

        let hits = store.search("docs", &[0.5, 0.5, 0.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(hits[0].doc_id, "a");
    }

    #[test]
    fn threshold_cuts_low_similarity() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);
        store
            .insert(
                "docs",
                "gemma3",
                vec![
                    doc("near", vec![1.0, 0.0, 0.0, 0.0]),
                    doc("far", vec![0.0, 0.0, 0.0, 1.0]),
                ],
            )
            .unwrap();

        let hits = store.search("docs", &[1.0, 0.0, 0.0, 0.0], 10, 0.5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "near");
    }

    #[test]
    fn compact_removes_near_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);
        store
            .insert(
                "docs",
                "gemma3",
                vec![
                    doc("original", vec![1.0, 0.0, 0.0, 0.0]),
                    doc("copy", vec![0.999, 0.001, 0.0, 0.0]),
                    doc("distinct", vec![0.0, 1.0, 0.0, 0.0]),
                ],
            )
            .unwrap();

        let removed = store.compact("docs").unwrap();
        assert_eq!(removed, vec!["copy".to_string()]);
        assert_eq!(store.count("docs").unwrap(), 2);

        // Dimensional integrity holds after insert/compact sequences.
        let hits = store.search("docs", &[0.0, 1.0, 0.0, 0.0], 10, 0.0).unwrap();
        assert_eq!(hits[0].doc_id, "distinct");
    }

    /// Backdate the last recorded switch so the cool-down window has
    /// passed; callers reopen the store to pick the file up.
    fn age_last_switch(base: &std::path::Path) {
        let path = base.join("default_model.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        let mut state: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let stale = chrono::Utc::now() - chrono::Duration::hours(2 * MODEL_SWITCH_COOLDOWN_HOURS);
        state["switched_at"] = json!(stale.to_rfc3339());
        std::fs::write(&path, state.to_string()).unwrap();
    }

    #[test]
    fn forced_switches_inside_cooldown_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);
        // First switch: no prior state, no window to wait out.
        store.switch_default_model("gemma3", true).unwrap();

        // A second switch right away is rejected, force or not.
        let err = store.switch_default_model("qwen3", true).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
        let err = store.switch_default_model("qwen3", false).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
        assert_eq!(store.default_model().as_deref(), Some("gemma3"));

        // Once the window has passed the switch goes through.
        age_last_switch(dir.path());
        let store = VectorStore::open(dir.path()).unwrap();
        store.switch_default_model("qwen3", true).unwrap();
        assert_eq!(store.default_model().as_deref(), Some("qwen3"));
    }

    #[test]
    fn model_switch_guard() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);
        store.switch_default_model("gemma3", true).unwrap();
        store
            .insert("docs", "gemma3", vec![doc("a", vec![1.0, 0.0, 0.0, 0.0])])
            .unwrap();
        age_last_switch(dir.path());
        let store = VectorStore::open(dir.path()).unwrap();

        // Cool-down elapsed, but the non-empty collection still blocks
        // an unforced switch.
        let err = store.switch_default_model("qwen3", false).unwrap_err();
        assert_eq!(err.code(), "conflict");

        store.switch_default_model("qwen3", true).unwrap();
        assert_eq!(store.default_model().as_deref(), Some("qwen3"));
    }

    #[test]
    fn locked_collection_blocks_model_switch_even_forced() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);
        store.switch_default_model("gemma3", true).unwrap();
        store.set_locked("docs", true).unwrap();
        age_last_switch(dir.path());
        let store = VectorStore::open(dir.path()).unwrap();

        let err = store.switch_default_model("qwen3", true).unwrap_err();
        assert_eq!(err.code(), "conflict");

        store.set_locked("docs", false).unwrap();
        store.switch_default_model("qwen3", true).unwrap();
    }

    #[test]
    fn same_id_insert_replaces_vector() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);
        store
            .insert("docs", "gemma3", vec![doc("a", vec![1.0, 0.0, 0.0, 0.0])])
            .unwrap();
        store
            .insert("docs", "gemma3", vec![doc("a", vec![0.0, 1.0, 0.0, 0.0])])
            .unwrap();

        assert_eq!(store.count("docs").unwrap(), 1);
        let hits = store.search("docs", &[0.0, 1.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }
}
