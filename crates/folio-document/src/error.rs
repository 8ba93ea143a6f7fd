//! Folio Document Errors
//!
//! Error types for the query grammar and the in-memory collection.
//!
//! @version 0.1.0
//! @author Folio Development Team

use thiserror::Error;

// =============================================================================
// Query Error
// =============================================================================

/// Errors raised while parsing or evaluating query documents.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    #[error("invalid sort specification: {0}")]
    InvalidSort(String),

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("invalid index specification: {0}")]
    InvalidIndex(String),

    #[error("invalid regex: {0}")]
    InvalidRegex(String),

    #[error("unknown explain verbosity: {0}")]
    InvalidExplainMode(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("division by zero")]
    DivisionByZero,
}

// =============================================================================
// Collection Error
// =============================================================================

/// Errors that can occur in collection operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectionError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("document with _id {0} already exists")]
    DuplicateId(String),

    #[error("validation failed: {}", .0.join(", "))]
    ValidationFailed(Vec<String>),

    #[error("index conflict: {0}")]
    IndexConflict(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl CollectionError {
    /// Returns true if the caller supplied a malformed query document.
    pub fn is_query_error(&self) -> bool {
        matches!(self, CollectionError::Query(_))
    }
}
