//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Every rejected operation carries the specific constraint that was
//! violated. Embedding unavailability is deliberately *not* part of this
//! enum's ingestion-path surface: a missing embedding degrades the result
//! (see [`crate::ingest`]) instead of failing it. Only semantic search,
//! which cannot proceed without a query vector, surfaces
//! [`FeedError::EmbeddingUnavailable`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Payload exceeds the configured upload ceiling. Raised before any
    /// parsing begins.
    #[error("payload of {actual} bytes exceeds the {limit} byte limit")]
    SizeExceeded { actual: u64, limit: u64 },

    /// The declared source kind is not one of the accepted kinds.
    #[error("unsupported source kind: {0}")]
    UnsupportedKind(String),

    /// No candidate character encoding decoded the input.
    #[error("no candidate encoding decoded the input")]
    Encoding,

    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The embedding service could not produce a vector and the operation
    /// cannot degrade (semantic search only).
    #[error("embedding service unavailable")]
    EmbeddingUnavailable,

    /// Another state-mutating operation is in flight for the same document
    /// identity. The caller may retry; the operation was not applied.
    #[error("concurrent operation in flight for document '{0}'")]
    ConcurrencyConflict(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document already deleted: {0}")]
    AlreadyDeleted(String),

    #[error("document is not deleted: {0}")]
    NotDeleted(String),

    /// The audit ledger could not record a deletion. The triggering
    /// operation is rolled back; an audit-less deletion never commits.
    #[error("audit ledger append failed: {0}")]
    Audit(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FeedError>;
