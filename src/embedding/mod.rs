//! Dense-vector embedding and reranking via a remote multi-model
//! service.

pub mod client;
pub mod models;

pub use client::{
    EmbeddingProvider, HashEmbeddingProvider, HttpEmbeddingClient, RerankEntry, RerankOutcome,
    identity_rerank,
};
pub use models::{EmbeddingModel, known_models, model_by_id};
