//! On-disk state: path layout, content-addressed reads, and the
//! relational store for structured records.

pub mod content;
pub mod layout;
pub mod relational;

pub use content::{ContentDigest, ContentStore, FileContent};
pub use layout::{Scope, StorageLayout, StoreKind};
pub use relational::{EntityRecord, FileRecord, RelationalStore, RelationshipRecord};
