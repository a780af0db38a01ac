//! The embedding models the service hosts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    pub id: &'static str,
    pub dimensionality: usize,
    /// GPU-only models fail fast when the service is unhealthy instead
    /// of degrading silently.
    pub gpu_only: bool,
}

/// Known models. The service hosts them simultaneously; selection is
/// per request, never a process-global mode.
pub fn known_models() -> &'static [EmbeddingModel] {
    const MODELS: &[EmbeddingModel] = &[
        EmbeddingModel {
            id: "qwen3",
            dimensionality: 2560,
            gpu_only: true,
        },
        EmbeddingModel {
            id: "gemma3",
            dimensionality: 768,
            gpu_only: false,
        },
    ];
    MODELS
}

pub fn model_by_id(id: &str) -> Option<&'static EmbeddingModel> {
    known_models().iter().find(|m| m.id == id)
}
