//! Folio Document - In-Memory Document Store
//!
//! Ordered documents and the query grammar used to address them: filters,
//! projections, sorts, update operators and aggregation pipelines, executed
//! against an indexed in-memory collection that can explain its plans.
//!
//! Key Features:
//! - Field-order preserving documents and the `doc!` macro
//! - Equality-prefix index selection with explain reports
//! - `$group` / `$project` / `$sort` pipelines with arithmetic expressions
//! - Schema validation on insert and update
//!
//! @version 0.1.0
//! @author Folio Development Team

pub mod aggregation;
pub mod collection;
pub mod error;
pub mod explain;
pub mod expr;
pub mod index;
pub mod query;
pub mod types;
pub mod update;
pub mod validation;

pub use aggregation::Pipeline;
pub use collection::{Collection, CollectionStats, DeleteResult, UpdateResult};
pub use error::{CollectionError, QueryError};
pub use explain::{ExplainMode, ExplainTarget, QueryPlan};
pub use index::{IndexDescriptor, IndexSpec};
pub use query::{Filter, Projection, Query, QueryResult, SortDirection, SortKey, SortSpec};
pub use types::{Document, DocumentId, Value};
pub use update::UpdateSpec;
pub use validation::{FieldSchema, FieldType, Schema};
