//! Keyword and symbol indexing on tantivy.

pub mod schema;
pub mod symbol_index;

pub use schema::KeywordSchema;
pub use symbol_index::{FileDocument, KeywordHit, SymbolIndex, tokenise};
