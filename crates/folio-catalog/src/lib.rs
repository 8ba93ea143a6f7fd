//! Folio Catalog - Named Query Definitions
//!
//! A registry of named, validated query definitions (finds, single-document
//! writes, aggregations, index management and explain requests) executed on
//! demand against an injected [`Store`].
//!
//! Key Features:
//! - Per-kind validation at registration time
//! - JSON catalog files with unknown-kind detection
//! - Store capability trait, implemented for the in-memory collection
//! - The stock books catalog with schema and seed data
//!
//! @version 0.1.0
//! @author Folio Development Team

pub mod books;
pub mod catalog;
pub mod definition;
pub mod error;
pub mod store;

pub use books::{book_schema, books_catalog, sample_books};
pub use catalog::{Cursor, ExecutionOutput, QueryCatalog};
pub use definition::{QueryDefinition, QueryKind};
pub use error::{CatalogError, CatalogResult, StoreError};
pub use store::Store;
