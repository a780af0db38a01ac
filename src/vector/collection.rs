//! Collection metadata and the model fingerprint sidecar.
//!
//! Every collection directory carries a `<name>.metadata.json` sidecar
//! recording the fingerprint `(model_id, dimensionality, schema_version)`
//! next to the vector payload. The fingerprint is revalidated on every
//! open; a collection never mixes vector spaces.

use crate::error::{RetrievalError, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bump when the on-disk vector layout changes.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub model_id: String,
    pub dimensionality: usize,
    pub schema_version: u32,
}

impl Fingerprint {
    pub fn new(model_id: impl Into<String>, dimensionality: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimensionality,
            schema_version: SCHEMA_VERSION,
        }
    }
}

/// Similarity function, fixed per collection at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Similarity {
    Cosine,
    /// Inner product; valid when the collection's vectors are
    /// L2-normalised.
    Dot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub name: String,
    pub fingerprint: Fingerprint,
    pub similarity: Similarity,
    pub created_at: String,
    pub vector_count: usize,
    /// Freezes the model: fingerprint changes are refused while set.
    pub locked: bool,
}

impl CollectionMetadata {
    pub fn new(name: impl Into<String>, fingerprint: Fingerprint, similarity: Similarity) -> Self {
        Self {
            name: name.into(),
            fingerprint,
            similarity,
            created_at: chrono::Utc::now().to_rfc3339(),
            vector_count: 0,
            locked: false,
        }
    }

    pub fn sidecar_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.metadata.json"))
    }

    pub fn load(dir: &Path, name: &str) -> RetrievalResult<Option<Self>> {
        let path = Self::sidecar_path(dir, name);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| RetrievalError::io_path(&path, e))?;
        let metadata = serde_json::from_str(&raw).map_err(|e| RetrievalError::io_path(&path, e))?;
        Ok(Some(metadata))
    }

    pub fn save(&self, dir: &Path) -> RetrievalResult<()> {
        let path = Self::sidecar_path(dir, &self.name);
        let json = serde_json::to_string_pretty(self).expect("metadata serialises");
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| RetrievalError::io_path(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| RetrievalError::io_path(&path, e))?;
        Ok(())
    }

    /// Model-only variant of the fingerprint check, used on write paths
    /// where dimensionality is validated per vector.
    pub fn check_model(&self, model_id: &str) -> RetrievalResult<()> {
        if self.fingerprint.model_id != model_id {
            return Err(RetrievalError::CollectionIncompatible {
                collection: self.name.clone(),
                expected: self.fingerprint.model_id.clone(),
                requested: model_id.to_string(),
            });
        }
        Ok(())
    }

    /// The hard invariant: writes and opens against a different model or
    /// dimensionality fail loudly.
    pub fn check_compatible(&self, model_id: &str, dimensionality: usize) -> RetrievalResult<()> {
        if self.fingerprint.model_id != model_id
            || self.fingerprint.dimensionality != dimensionality
        {
            return Err(RetrievalError::CollectionIncompatible {
                collection: self.name.clone(),
                expected: format!(
                    "{} ({}d)",
                    self.fingerprint.model_id, self.fingerprint.dimensionality
                ),
                requested: format!("{model_id} ({dimensionality}d)"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sidecar_round_trips() {
        let dir = TempDir::new().unwrap();
        let meta = CollectionMetadata::new(
            "docs",
            Fingerprint::new("qwen3", 2560),
            Similarity::Cosine,
        );
        meta.save(dir.path()).unwrap();

        let loaded = CollectionMetadata::load(dir.path(), "docs").unwrap().unwrap();
        assert_eq!(loaded.fingerprint, meta.fingerprint);
        assert_eq!(loaded.similarity, Similarity::Cosine);
        assert_eq!(loaded.fingerprint.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn missing_sidecar_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(CollectionMetadata::load(dir.path(), "ghost").unwrap().is_none());
    }

    #[test]
    fn incompatible_model_fails_loudly() {
        let meta = CollectionMetadata::new(
            "docs",
            Fingerprint::new("qwen3", 2560),
            Similarity::Cosine,
        );
        assert!(meta.check_compatible("qwen3", 2560).is_ok());

        let err = meta.check_compatible("gemma3", 768).unwrap_err();
        assert_eq!(err.code(), "collection_incompatible");
        let err = meta.check_compatible("qwen3", 768).unwrap_err();
        assert_eq!(err.code(), "collection_incompatible");
    }
}
