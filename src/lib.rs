//! Lodestone: a hybrid code-and-knowledge retrieval engine for MCP
//! developer assistants.
//!
//! The core is a content-addressed, AST-aware index plus a hybrid
//! search pipeline: symbol-aware BM25 over tantivy, dense vectors from a
//! remote embedding service, reciprocal-rank fusion, and an optional
//! neural reranker. A benchmark harness evaluates every retrieval mode
//! against labelled query suites.

pub mod bench;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod index;
pub mod indexing;
pub mod knowledge;
pub mod mcp;
pub mod parsing;
pub mod project;
pub mod retrieve;
pub mod storage;
pub mod types;
pub mod vector;

pub use config::Settings;
pub use context::AppContext;
pub use error::{RetrievalError, RetrievalResult};
pub use parsing::{Language, ParserRegistry};
pub use retrieve::{HybridRetriever, RetrievalMode, SearchRequest};
pub use storage::{ContentStore, Scope, StorageLayout};
pub use types::{FileId, Import, Range, Symbol, SymbolId, SymbolKind};
