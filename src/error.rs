//! Error types for the retrieval engine.
//!
//! Every error carries a stable machine-readable code plus a human-readable
//! message, and where relevant the offending identifier (path, collection,
//! model). Parse failures are never fatal: they are recorded in per-file
//! diagnostics and recovered locally.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for retrieval operations.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Filesystem or network failure. Always names the path or endpoint.
    #[error("I/O failure on '{target}': {message}")]
    IoFailure { target: String, message: String },

    /// A file parsed partially. Never fatal; recorded in diagnostics.
    #[error("Parse failure in '{path}': {reason}")]
    ParseFailure { path: PathBuf, reason: String },

    /// An embedding arrived with an unexpected dimensionality. Fatal for
    /// that call; vectors are never silently truncated.
    #[error(
        "Embedding dimension mismatch for model '{model}': expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    /// A collection's fingerprint disagrees with the requested model.
    #[error(
        "Collection '{collection}' is fingerprinted for '{expected}' but '{requested}' was requested"
    )]
    CollectionIncompatible {
        collection: String,
        expected: String,
        requested: String,
    },

    /// The embedding or reranker endpoint is down.
    #[error("Service unavailable at '{endpoint}': {message}")]
    ServiceUnavailable { endpoint: String, message: String },

    /// Caller-side schema violation. Never retried.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Deadline exceeded or external cancel.
    #[error("Cancelled: {context}")]
    Cancelled { context: String },

    /// Two writers raced on the same resource. Retried once, then surfaced.
    #[error("Conflict on '{resource}': {message}")]
    Conflict { resource: String, message: String },
}

impl RetrievalError {
    /// Stable code for the error kind, suitable for wire protocols.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IoFailure { .. } => "io_failure",
            Self::ParseFailure { .. } => "parse_failure",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::CollectionIncompatible { .. } => "collection_incompatible",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Cancelled { .. } => "cancelled",
            Self::Conflict { .. } => "conflict",
        }
    }

    pub fn io(target: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::IoFailure {
            target: target.into(),
            message: source.to_string(),
        }
    }

    pub fn io_path(path: &std::path::Path, source: impl std::fmt::Display) -> Self {
        Self::IoFailure {
            target: path.display().to_string(),
            message: source.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }
}

/// Errors from the relational store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to open database at '{path}': {message}")]
    Open { path: PathBuf, message: String },

    #[error("Storage corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("Writer conflict on '{resource}'")]
    Conflict { resource: String },
}

impl From<StoreError> for RetrievalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { resource } => Self::Conflict {
                resource,
                message: "concurrent writer".to_string(),
            },
            other => Self::IoFailure {
                target: "relational store".to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Errors from the keyword/symbol index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Tantivy operation failed during {operation}: {cause}")]
    Tantivy { operation: String, cause: String },

    #[error("Failed to open index at '{path}': {message}")]
    Open { path: PathBuf, message: String },
}

impl IndexError {
    pub fn tantivy(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::Tantivy {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

impl From<IndexError> for RetrievalError {
    fn from(err: IndexError) -> Self {
        Self::IoFailure {
            target: "symbol index".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Result type alias for relational store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let cases: Vec<(RetrievalError, &str)> = vec![
            (RetrievalError::io("a.rs", "denied"), "io_failure"),
            (
                RetrievalError::ParseFailure {
                    path: "x.ts".into(),
                    reason: "unterminated string".into(),
                },
                "parse_failure",
            ),
            (
                RetrievalError::DimensionMismatch {
                    model: "qwen3".into(),
                    expected: 2560,
                    actual: 768,
                },
                "dimension_mismatch",
            ),
            (
                RetrievalError::CollectionIncompatible {
                    collection: "docs".into(),
                    expected: "qwen3".into(),
                    requested: "gemma3".into(),
                },
                "collection_incompatible",
            ),
            (
                RetrievalError::ServiceUnavailable {
                    endpoint: "http://localhost:8090".into(),
                    message: "connection refused".into(),
                },
                "service_unavailable",
            ),
            (RetrievalError::invalid("bad k"), "invalid_argument"),
            (RetrievalError::cancelled("deadline"), "cancelled"),
            (
                RetrievalError::Conflict {
                    resource: "docs".into(),
                    message: "writer raced".into(),
                },
                "conflict",
            ),
        ];

        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn messages_name_the_offender() {
        let err = RetrievalError::CollectionIncompatible {
            collection: "project-docs".into(),
            expected: "qwen3".into(),
            requested: "gemma3".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("project-docs"));
        assert!(msg.contains("qwen3"));
        assert!(msg.contains("gemma3"));
    }
}
