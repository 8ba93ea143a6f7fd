//! Folio Query Catalog
//!
//! An ordered, name-indexed set of query definitions that can be executed
//! against any [`Store`].
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::definition::{QueryDefinition, QueryKind, RawDefinition};
use crate::error::{CatalogError, CatalogResult, StoreError};
use crate::store::Store;
use folio_document::{
    CollectionError, DeleteResult, Document, ExplainMode, ExplainTarget, IndexDescriptor,
    Projection, QueryError, UpdateResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, trace, warn};

// =============================================================================
// Cursor
// =============================================================================

/// Ordered, finite sequence of result documents. Each `execute` call returns
/// a fresh cursor.
#[derive(Debug)]
pub struct Cursor {
    documents: std::vec::IntoIter<Document>,
}

impl Cursor {
    fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents.into_iter(),
        }
    }

    /// Documents not yet consumed.
    pub fn remaining(&self) -> usize {
        self.documents.len()
    }
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.documents.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}

// =============================================================================
// Execution Output
// =============================================================================

/// Result of executing one definition.
#[derive(Debug)]
pub enum ExecutionOutput {
    /// Find and aggregate results.
    Documents(Cursor),
    Updated(UpdateResult),
    Deleted(DeleteResult),
    IndexCreated(IndexDescriptor),
    Indexes(Vec<IndexDescriptor>),
    /// Store-defined explain report, returned unchanged.
    Report(Document),
}

impl ExecutionOutput {
    /// The cursor of a find or aggregate.
    pub fn into_cursor(self) -> Option<Cursor> {
        match self {
            Self::Documents(cursor) => Some(cursor),
            _ => None,
        }
    }

    /// Collect all output into a JSON value, consuming any cursor.
    pub fn into_json(self) -> CatalogResult<serde_json::Value> {
        let value = match self {
            Self::Documents(cursor) => serde_json::to_value(cursor.collect::<Vec<_>>())?,
            Self::Updated(result) => serde_json::to_value(result)?,
            Self::Deleted(result) => serde_json::to_value(result)?,
            Self::IndexCreated(descriptor) => serde_json::to_value(descriptor)?,
            Self::Indexes(descriptors) => serde_json::to_value(descriptors)?,
            Self::Report(report) => serde_json::to_value(report)?,
        };
        Ok(value)
    }
}

// =============================================================================
// Query Catalog
// =============================================================================

/// On-disk catalog layout: `{"definitions": [...]}`.
#[derive(Serialize)]
struct CatalogFile<'a> {
    definitions: &'a [QueryDefinition],
}

#[derive(Deserialize)]
struct RawCatalogFile {
    definitions: Vec<RawDefinition>,
}

/// Named query definitions in registration order.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    definitions: Vec<QueryDefinition>,
    by_name: HashMap<String, usize>,
    default_explain_mode: ExplainMode,
}

impl QueryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog, registering each definition in order.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = QueryDefinition>,
    ) -> CatalogResult<Self> {
        let mut catalog = Self::new();
        for definition in definitions {
            catalog.register(definition)?;
        }
        Ok(catalog)
    }

    /// Parse a JSON catalog file's contents.
    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        let file: RawCatalogFile = serde_json::from_str(json)?;
        let definitions = file
            .definitions
            .into_iter()
            .map(QueryDefinition::try_from)
            .collect::<CatalogResult<Vec<_>>>()?;
        Self::from_definitions(definitions)
    }

    /// Load a JSON catalog file.
    pub fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&json)?;
        debug!(path = %path.display(), definitions = catalog.len(), "loaded query catalog");
        Ok(catalog)
    }

    /// Serialize as a catalog file.
    pub fn to_json_string(&self) -> CatalogResult<String> {
        let file = CatalogFile {
            definitions: &self.definitions,
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Verbosity used for explain definitions that do not name one.
    pub fn with_default_explain_mode(mut self, mode: ExplainMode) -> Self {
        self.default_explain_mode = mode;
        self
    }

    pub fn default_explain_mode(&self) -> ExplainMode {
        self.default_explain_mode
    }

    /// Validate and add a definition. The catalog is unchanged on failure.
    pub fn register(&mut self, definition: QueryDefinition) -> CatalogResult<()> {
        if self.by_name.contains_key(&definition.name) {
            return Err(CatalogError::DuplicateName(definition.name));
        }
        definition.validate()?;

        debug!(name = %definition.name, kind = %definition.kind, "registered query");
        self.by_name
            .insert(definition.name.clone(), self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> CatalogResult<&QueryDefinition> {
        self.by_name
            .get(name)
            .map(|&i| &self.definitions[i])
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Definition names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Execute the named definition against `store`.
    pub fn execute<S: Store + ?Sized>(&self, name: &str, store: &S) -> CatalogResult<ExecutionOutput> {
        let definition = self.get(name)?;
        debug!(name, kind = %definition.kind, "executing query");

        let output = self.run(definition, store).map_err(|err| {
            if let CatalogError::Store(store_err) = &err {
                warn!(name, error = %store_err, "store rejected query");
            }
            err
        })?;

        if let ExecutionOutput::Documents(cursor) = &output {
            trace!(name, documents = cursor.remaining(), "query returned");
        }
        Ok(output)
    }

    /// Execute every definition in order, stopping at the first error.
    pub fn execute_all<S: Store + ?Sized>(
        &self,
        store: &S,
    ) -> CatalogResult<Vec<(String, ExecutionOutput)>> {
        self.definitions
            .iter()
            .map(|d| -> CatalogResult<(String, ExecutionOutput)> {
                Ok((d.name.clone(), self.execute(&d.name, store)?))
            })
            .collect()
    }

    fn run<S: Store + ?Sized>(
        &self,
        definition: &QueryDefinition,
        store: &S,
    ) -> CatalogResult<ExecutionOutput> {
        let empty = Document::new();
        let filter = definition.filter.as_ref().unwrap_or(&empty);

        let output = match definition.kind {
            QueryKind::Find => ExecutionOutput::Documents(self.find(definition, filter, store)?),
            QueryKind::UpdateOne => {
                let update = definition.update.as_ref().unwrap_or(&empty);
                ExecutionOutput::Updated(store.update_one(filter, update)?)
            }
            QueryKind::DeleteOne => ExecutionOutput::Deleted(store.delete_one(filter)?),
            QueryKind::Aggregate => {
                let pipeline = definition.pipeline.as_deref().unwrap_or_default();
                ExecutionOutput::Documents(Cursor::new(store.aggregate(pipeline)?))
            }
            QueryKind::CreateIndex => match &definition.index_spec {
                Some(spec) => ExecutionOutput::IndexCreated(store.create_index(spec)?),
                None => {
                    return Err(CatalogError::validation(
                        &definition.name,
                        "createIndex requires index_spec",
                    ))
                }
            },
            QueryKind::ListIndexes => ExecutionOutput::Indexes(store.list_indexes()?),
            QueryKind::Explain => {
                let target = match &definition.pipeline {
                    Some(pipeline) => ExplainTarget::aggregate(pipeline.clone()),
                    None => ExplainTarget::Find {
                        filter: filter.clone(),
                        sort: definition.sort.clone(),
                    },
                };
                let mode = definition.explain_mode.unwrap_or(self.default_explain_mode);
                ExecutionOutput::Report(store.explain(&target, mode)?)
            }
        };
        Ok(output)
    }

    /// Find: fetch, then sort, skip and limit. A limit of 0 means no limit.
    /// With a sort the projection is applied here after paging so sort keys
    /// may be projected away.
    fn find<S: Store + ?Sized>(
        &self,
        definition: &QueryDefinition,
        filter: &Document,
        store: &S,
    ) -> CatalogResult<Cursor> {
        let projection = definition.projection.as_ref();

        let mut documents = match (&definition.sort, projection) {
            (Some(_), Some(_)) => store.find(filter, None)?,
            _ => store.find(filter, projection)?,
        };

        if let Some(sort) = &definition.sort {
            sort.sort(&mut documents);
        }

        let page = documents
            .into_iter()
            .skip(definition.skip.unwrap_or(0))
            .take(definition.limit.filter(|&n| n > 0).unwrap_or(usize::MAX));

        // Projection errors surface as store errors on both paths.
        let documents = match (&definition.sort, projection) {
            (Some(_), Some(projection)) => {
                let projection = Projection::parse(projection).map_err(projection_error)?;
                page.map(|doc| projection.apply(&doc).map_err(projection_error))
                    .collect::<Result<Vec<_>, StoreError>>()?
            }
            _ => page.collect(),
        };

        Ok(Cursor::new(documents))
    }
}

fn projection_error(err: QueryError) -> StoreError {
    StoreError::from(CollectionError::from(err))
}

// =============================================================================
// Tests
// =============================================================================
