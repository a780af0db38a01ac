//! Model-fingerprinted vector collections.

pub mod collection;
pub mod store;

pub use collection::{CollectionMetadata, Fingerprint, SCHEMA_VERSION, Similarity};
pub use store::{
    EmbeddedDocument, MODEL_SWITCH_COOLDOWN_HOURS, VectorHit, VectorStore, cosine_similarity,
    dot_product,
};
