//! Configuration for the retrieval engine.
//!
//! Layered configuration: built-in defaults, then an optional
//! `settings.toml` at the storage root, then environment variables.
//!
//! # Environment Variables
//!
//! General settings use the `LODESTONE_` prefix with double underscores for
//! nesting (`LODESTONE_EMBEDDING__SERVICE_URL=...`). Three variables are
//! honoured without the prefix because the surrounding tooling sets them:
//!
//! - `MCPTOOLS_SCOPE` — force the storage scope (`project` or `global`)
//! - `MCPTOOLS_EMBEDDING_URL` — embedding service endpoint
//! - `MCPTOOLS_DATA_DIR` — override the data directory entirely

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable forcing the storage scope.
pub const ENV_SCOPE: &str = "MCPTOOLS_SCOPE";
/// Environment variable pointing at the embedding service.
pub const ENV_EMBEDDING_URL: &str = "MCPTOOLS_EMBEDDING_URL";
/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "MCPTOOLS_DATA_DIR";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema.
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Number of parallel threads for parsing.
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Patterns to ignore during indexing, in addition to `.gitignore`
    /// and `.claudeignore`.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Embedding batch size for bulk indexing.
    #[serde(default = "default_embed_batch")]
    pub embed_batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service.
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Default model id for new collections.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Upper bound on concurrent requests to the service.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Health check timeout in milliseconds.
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Reciprocal-rank fusion constant.
    #[serde(default = "default_rrf_c")]
    pub rrf_c: f64,

    /// Weight of the keyword channel in fusion.
    #[serde(default = "default_weight")]
    pub rrf_weight_bm25: f64,

    /// Weight of the vector channel in fusion.
    #[serde(default = "default_weight")]
    pub rrf_weight_vector: f64,

    /// Enable the neural reranker stage.
    #[serde(default)]
    pub rerank: bool,

    /// Reranker model id.
    #[serde(default = "default_rerank_model")]
    pub rerank_model: String,

    /// Memoise hybrid pipelines by query fingerprint.
    #[serde(default = "default_true")]
    pub memoise: bool,

    /// Query deadline in milliseconds; 0 disables.
    #[serde(default)]
    pub deadline_ms: u64,
}

fn default_version() -> u32 {
    1
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_embed_batch() -> usize {
    64
}
fn default_service_url() -> String {
    "http://127.0.0.1:8090".to_string()
}
fn default_model() -> String {
    "qwen3".to_string()
}
fn default_max_in_flight() -> usize {
    8
}
fn default_health_timeout_ms() -> u64 {
    2_000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_rrf_c() -> f64 {
    60.0
}
fn default_weight() -> f64 {
    1.0
}
fn default_rerank_model() -> String {
    "qwen3".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            indexing: IndexingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            ignore_patterns: vec![
                "target/**".to_string(),
                "node_modules/**".to_string(),
                ".git/**".to_string(),
            ],
            embed_batch_size: default_embed_batch(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            default_model: default_model(),
            max_in_flight: default_max_in_flight(),
            health_timeout_ms: default_health_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_c: default_rrf_c(),
            rrf_weight_bm25: default_weight(),
            rrf_weight_vector: default_weight(),
            rerank: false,
            rerank_model: default_rerank_model(),
            memoise: default_true(),
            deadline_ms: 0,
        }
    }
}

impl Settings {
    /// Load settings: defaults, then `settings.toml` under the storage
    /// root if present, then `LODESTONE_*` environment overrides, then
    /// the dedicated `MCPTOOLS_*` variables.
    pub fn load(storage_root: Option<&Path>) -> Self {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        if let Some(root) = storage_root {
            let config_path = root.join("settings.toml");
            if config_path.exists() {
                figment = figment.merge(Toml::file(config_path));
            }
        }

        figment = figment.merge(Env::prefixed("LODESTONE_").split("__"));

        let mut settings: Settings = match figment.extract() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Invalid configuration, using defaults: {e}");
                Settings::default()
            }
        };

        if let Ok(url) = std::env::var(ENV_EMBEDDING_URL) {
            if !url.trim().is_empty() {
                settings.embedding.service_url = url;
            }
        }

        settings
    }
}

/// Sidecar written at the storage root recording the default embedding
/// model and the service endpoint, so other tools in the family can
/// discover them without parsing the full settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfigFile {
    pub default_model: String,
    pub service_url: String,
}

impl EmbeddingConfigFile {
    pub const FILE_NAME: &'static str = "embedding_config.json";

    pub fn load(storage_root: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(storage_root.join(Self::FILE_NAME)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&self, storage_root: &Path) -> std::io::Result<()> {
        let path = storage_root.join(Self::FILE_NAME);
        let json = serde_json::to_string_pretty(self).expect("serialisable");
        std::fs::write(path, json)
    }
}
