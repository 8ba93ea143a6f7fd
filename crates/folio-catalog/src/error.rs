//! Folio Catalog Errors
//!
//! @version 0.1.0
//! @author Folio Development Team

use folio_document::CollectionError;
use std::error::Error as StdError;
use thiserror::Error;

// =============================================================================
// Store Error
// =============================================================================

/// Failure reported by a [`crate::Store`]. Carries the store's message and,
/// when available, the underlying error.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The wrapped collection error, when the store is a [`folio_document::Collection`].
    pub fn collection_error(&self) -> Option<&CollectionError> {
        self.source.as_ref()?.downcast_ref::<CollectionError>()
    }
}

impl From<CollectionError> for StoreError {
    fn from(err: CollectionError) -> Self {
        Self::with_source(err.to_string(), err)
    }
}

// =============================================================================
// Catalog Error
// =============================================================================

/// Errors raised by the query catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid definition '{name}': {reason}")]
    Validation { name: String, reason: String },

    #[error("a definition named '{0}' is already registered")]
    DuplicateName(String),

    #[error("no definition named '{0}'")]
    NotFound(String),

    #[error("unknown query kind '{0}'")]
    UnknownKind(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub(crate) fn validation(name: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

// =============================================================================
// Tests
// =============================================================================
