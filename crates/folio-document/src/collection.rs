//! Folio Document Collection
//!
//! In-memory collection of documents kept in insertion order, with
//! secondary indexes, update and aggregation support and explain reports.
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::aggregation::Pipeline;
use crate::error::CollectionError;
use crate::explain::{ExecutionStats, ExplainMode, ExplainReport, ExplainTarget, QueryPlan};
use crate::index::{DocumentIndex, IndexDescriptor, IndexSpec};
use crate::query::{Filter, Query, QueryResult};
use crate::types::{Document, DocumentId, Value};
use crate::update::UpdateSpec;
use crate::validation::Schema;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, trace};

// =============================================================================
// Operation Results
// =============================================================================

/// Outcome of an `update_one`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

/// Outcome of a `delete_one`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted: u64,
}

/// Operation counters for a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub documents_inserted: u64,
    pub documents_updated: u64,
    pub documents_deleted: u64,
    pub queries_executed: u64,
    pub aggregations_executed: u64,
    pub indexes_created: u64,
}

// =============================================================================
// Collection
// =============================================================================

/// A collection of documents.
pub struct Collection {
    name: String,
    state: RwLock<CollectionState>,
    schema: Option<Schema>,
    stats: RwLock<CollectionStats>,
}

impl Collection {
    /// Create a new collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(CollectionState::new()),
            schema: None,
            stats: RwLock::new(CollectionStats::default()),
        }
    }

    /// Create a collection with schema validation.
    pub fn with_schema(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            schema: Some(schema),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    // -------------------------------------------------------------------------
    // Document Operations
    // -------------------------------------------------------------------------

    /// Insert a document, assigning a generated `_id` when it has none.
    /// Returns the document's `_id`.
    pub fn insert(&self, doc: Document) -> Result<Value, CollectionError> {
        let doc = if doc.contains("_id") {
            doc
        } else {
            std::iter::once(("_id".to_string(), Value::from(DocumentId::generate())))
                .chain(doc)
                .collect()
        };

        let id = doc.id().cloned().unwrap_or_default();
        if matches!(id, Value::Array(_)) {
            return Err(CollectionError::InvalidDocument(
                "_id cannot be an array".to_string(),
            ));
        }
        self.check_schema(&doc)?;

        {
            let mut state = self.state.write();
            if state.id_index().contains_values(std::slice::from_ref(&id)) {
                return Err(CollectionError::DuplicateId(id.to_string()));
            }
            state.append(doc);
        }

        self.stats.write().documents_inserted += 1;
        trace!(collection = %self.name, id = %id, "inserted document");
        Ok(id)
    }

    /// Insert several documents, stopping at the first failure.
    pub fn insert_many(
        &self,
        docs: impl IntoIterator<Item = Document>,
    ) -> Result<Vec<Value>, CollectionError> {
        docs.into_iter().map(|doc| self.insert(doc)).collect()
    }

    /// Look a document up by `_id`.
    pub fn get(&self, id: &Value) -> Option<Document> {
        let state = self.state.read();
        let lookup = state.id_index().lookup_prefix(std::slice::from_ref(id));
        lookup
            .positions
            .first()
            .and_then(|p| state.documents.get(p))
            .cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All documents in natural order.
    pub fn all(&self) -> Vec<Document> {
        self.state.read().documents.values().cloned().collect()
    }

    /// Remove every document. Index definitions are kept.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.documents.clear();
        for index in state.indexes.iter_mut() {
            index.clear();
        }
    }

    // -------------------------------------------------------------------------
    // Query Operations
    // -------------------------------------------------------------------------

    /// Find documents matching a query: filter, then sort, skip, limit and
    /// finally projection. A limit of 0 returns every match.
    pub fn find(&self, query: &Query) -> Result<QueryResult, CollectionError> {
        let start = Instant::now();
        let scan = self.state.read().matching(&query.filter);

        let mut documents = scan.documents;
        if let Some(sort) = &query.sort {
            sort.sort(&mut documents);
        }

        let page = documents
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.filter(|&n| n > 0).unwrap_or(usize::MAX));
        let documents = match &query.projection {
            Some(projection) => page
                .map(|doc| projection.apply(&doc))
                .collect::<Result<Vec<_>, _>>()?,
            None => page.collect(),
        };

        self.stats.write().queries_executed += 1;
        debug!(
            collection = %self.name,
            stage = scan.plan.stage(),
            returned = documents.len(),
            examined = scan.docs_examined,
            "find"
        );

        Ok(QueryResult {
            documents,
            plan: scan.plan,
            total_scanned: scan.docs_examined,
            keys_examined: scan.keys_examined,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// First matching document in natural order.
    pub fn find_one(&self, filter: &Filter) -> Option<Document> {
        let state = self.state.read();
        state
            .first_match(filter)
            .and_then(|p| state.documents.get(&p))
            .cloned()
    }

    /// Number of documents matching a filter.
    pub fn count(&self, filter: &Filter) -> usize {
        self.state.read().matching(filter).documents.len()
    }

    // -------------------------------------------------------------------------
    // Write Operations
    // -------------------------------------------------------------------------

    /// Apply an update document to the first match in natural order.
    pub fn update_one(
        &self,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateResult, CollectionError> {
        let filter = Filter::parse(filter)?;
        let update = UpdateSpec::parse(update)?;

        let mut state = self.state.write();
        let position = match state.first_match(&filter) {
            Some(position) => position,
            None => {
                debug!(collection = %self.name, "update_one matched nothing");
                return Ok(UpdateResult::default());
            }
        };

        let updated = match state.documents.get(&position) {
            Some(current) => update.apply(current)?,
            None => return Ok(UpdateResult::default()),
        };
        let updated = match updated {
            Some(doc) => doc,
            None => {
                return Ok(UpdateResult {
                    matched: 1,
                    modified: 0,
                })
            }
        };

        self.check_schema(&updated)?;
        state.replace(position, updated);
        drop(state);

        self.stats.write().documents_updated += 1;
        debug!(
            collection = %self.name,
            position,
            fields = ?update.paths().collect::<Vec<_>>(),
            "updated document"
        );
        Ok(UpdateResult {
            matched: 1,
            modified: 1,
        })
    }

    /// Delete the first match in natural order.
    pub fn delete_one(&self, filter: &Document) -> Result<DeleteResult, CollectionError> {
        let filter = Filter::parse(filter)?;

        let removed = {
            let mut state = self.state.write();
            match state.first_match(&filter) {
                Some(position) => state.remove(position).is_some(),
                None => false,
            }
        };

        if !removed {
            debug!(collection = %self.name, "delete_one matched nothing");
            return Ok(DeleteResult { deleted: 0 });
        }

        self.stats.write().documents_deleted += 1;
        debug!(collection = %self.name, "deleted document");
        Ok(DeleteResult { deleted: 1 })
    }

    // -------------------------------------------------------------------------
    // Aggregation
    // -------------------------------------------------------------------------

    /// Run an aggregation pipeline over the collection.
    pub fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>, CollectionError> {
        let pipeline = Pipeline::parse(pipeline)?;
        let input = self.pipeline_input(&pipeline).documents;
        let output = pipeline.execute(input)?;

        self.stats.write().aggregations_executed += 1;
        debug!(
            collection = %self.name,
            stages = pipeline.len(),
            returned = output.len(),
            "aggregate"
        );
        Ok(output)
    }

    /// Documents fed into a pipeline. A leading `$match` narrows the input
    /// through an index when possible; the stage still runs afterwards.
    fn pipeline_input(&self, pipeline: &Pipeline) -> Scan {
        let state = self.state.read();
        match pipeline.leading_match() {
            Some(filter) => state.matching(filter),
            None => state.scan_all(),
        }
    }

    // -------------------------------------------------------------------------
    // Index Operations
    // -------------------------------------------------------------------------

    /// Create an index. An index with the same key pattern is returned as is.
    pub fn create_index(&self, spec: &IndexSpec) -> Result<IndexDescriptor, CollectionError> {
        let descriptor = IndexDescriptor::new(spec.clone());
        let mut state = self.state.write();

        if let Some(existing) = state.indexes.iter().find(|i| i.descriptor().key == *spec) {
            debug!(collection = %self.name, index = existing.name(), "index already exists");
            return Ok(existing.descriptor().clone());
        }
        if state.indexes.iter().any(|i| i.name() == descriptor.name) {
            return Err(CollectionError::IndexConflict(format!(
                "an index named '{}' already exists with a different key",
                descriptor.name
            )));
        }

        let mut index = DocumentIndex::new(descriptor.clone());
        for (position, doc) in &state.documents {
            index.insert(*position, doc);
        }
        state.indexes.push(index);
        drop(state);

        self.stats.write().indexes_created += 1;
        debug!(collection = %self.name, index = %descriptor.name, "created index");
        Ok(descriptor)
    }

    /// Drop an index by name. The `_id_` index cannot be dropped.
    pub fn drop_index(&self, name: &str) -> Result<(), CollectionError> {
        if name == IndexDescriptor::id_index().name {
            return Err(CollectionError::IndexConflict(
                "cannot drop the _id index".to_string(),
            ));
        }

        let mut state = self.state.write();
        let before = state.indexes.len();
        state.indexes.retain(|i| i.name() != name);
        if state.indexes.len() == before {
            return Err(CollectionError::IndexNotFound(name.to_string()));
        }
        debug!(collection = %self.name, index = name, "dropped index");
        Ok(())
    }

    /// Index descriptors in creation order, `_id_` first.
    pub fn list_indexes(&self) -> Vec<IndexDescriptor> {
        self.state
            .read()
            .indexes
            .iter()
            .map(|i| i.descriptor().clone())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Explain
    // -------------------------------------------------------------------------

    /// Describe how a find or aggregation would run. Execution modes run
    /// the operation to gather statistics; nothing is modified.
    pub fn explain(
        &self,
        target: &ExplainTarget,
        mode: ExplainMode,
    ) -> Result<Document, CollectionError> {
        let start = Instant::now();

        let report = match target {
            ExplainTarget::Find { filter, sort } => {
                let parsed = Filter::parse(filter)?;
                let scan = self.state.read().matching(&parsed);
                let stats = ExecutionStats {
                    n_returned: scan.documents.len(),
                    total_docs_examined: scan.docs_examined,
                    total_keys_examined: scan.keys_examined,
                    execution_time_millis: start.elapsed().as_millis() as u64,
                };
                ExplainReport::new(&self.name, mode, &scan.plan)
                    .with_query(filter)
                    .with_sort(sort.as_ref())
                    .with_stats(stats)
                    .build()
            }
            ExplainTarget::Aggregate { pipeline } => {
                let parsed = Pipeline::parse(pipeline)?;
                let scan = self.pipeline_input(&parsed);
                let docs_examined = scan.docs_examined;
                let n_returned = if mode.executes() {
                    parsed.execute(scan.documents)?.len()
                } else {
                    0
                };
                let stats = ExecutionStats {
                    n_returned,
                    total_docs_examined: docs_examined,
                    total_keys_examined: scan.keys_examined,
                    execution_time_millis: start.elapsed().as_millis() as u64,
                };
                ExplainReport::new(&self.name, mode, &scan.plan)
                    .with_stages(parsed.stage_names())
                    .with_stats(stats)
                    .build()
            }
        };

        debug!(collection = %self.name, verbosity = %mode, "explain");
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------------

    pub fn stats(&self) -> CollectionStats {
        self.stats.read().clone()
    }

    fn check_schema(&self, doc: &Document) -> Result<(), CollectionError> {
        match &self.schema {
            Some(schema) => schema
                .validate(doc)
                .map_err(CollectionError::ValidationFailed),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Collection State
// =============================================================================

/// Documents keyed by insertion position plus the indexes over them.
struct CollectionState {
    documents: BTreeMap<u64, Document>,
    next_position: u64,
    indexes: Vec<DocumentIndex>,
}

/// Documents produced by a scan together with the plan that produced them.
struct Scan {
    plan: QueryPlan,
    documents: Vec<Document>,
    docs_examined: usize,
    keys_examined: usize,
}

impl CollectionState {
    fn new() -> Self {
        Self {
            documents: BTreeMap::new(),
            next_position: 0,
            indexes: vec![DocumentIndex::new(IndexDescriptor::id_index())],
        }
    }

    fn id_index(&self) -> &DocumentIndex {
        &self.indexes[0]
    }

    fn append(&mut self, doc: Document) {
        let position = self.next_position;
        self.next_position += 1;
        for index in self.indexes.iter_mut() {
            index.insert(position, &doc);
        }
        self.documents.insert(position, doc);
    }

    fn replace(&mut self, position: u64, doc: Document) {
        self.remove(position);
        for index in self.indexes.iter_mut() {
            index.insert(position, &doc);
        }
        self.documents.insert(position, doc);
    }

    fn remove(&mut self, position: u64) -> Option<Document> {
        let doc = self.documents.remove(&position)?;
        for index in self.indexes.iter_mut() {
            index.remove(position, &doc);
        }
        Some(doc)
    }

    /// Pick the usable index covering the longest prefix of equality
    /// constraints. Multikey indexes are skipped.
    fn plan(&self, filter: &Filter) -> QueryPlan {
        let constraints = filter.equality_constraints();
        let mut best: Option<(&DocumentIndex, Vec<Value>)> = None;

        for index in self.indexes.iter().filter(|i| !i.is_multikey()) {
            let prefix: Vec<Value> = index
                .descriptor()
                .key
                .keys()
                .iter()
                .map_while(|key| {
                    constraints
                        .iter()
                        .find(|(field, _)| *field == key.field)
                        .map(|(_, value)| (*value).clone())
                })
                .collect();

            let longer = match &best {
                Some((_, current)) => prefix.len() > current.len(),
                None => !prefix.is_empty(),
            };
            if longer {
                best = Some((index, prefix));
            }
        }

        match best {
            Some((index, prefix)) => QueryPlan::IndexScan {
                index_name: index.name().to_string(),
                key_pattern: index.descriptor().key.to_document(),
                prefix,
            },
            None => QueryPlan::CollectionScan,
        }
    }

    /// Candidate positions for a plan, in natural order, and keys examined.
    fn candidates(&self, plan: &QueryPlan) -> (Vec<u64>, usize) {
        if let QueryPlan::IndexScan {
            index_name, prefix, ..
        } = plan
        {
            if let Some(index) = self.indexes.iter().find(|i| i.name() == index_name) {
                let lookup = index.lookup_prefix(prefix);
                return (lookup.positions, lookup.keys_examined);
            }
        }
        (self.documents.keys().copied().collect(), 0)
    }

    fn first_match(&self, filter: &Filter) -> Option<u64> {
        let (positions, _) = self.candidates(&self.plan(filter));
        positions.into_iter().find(|p| {
            self.documents
                .get(p)
                .map_or(false, |doc| filter.matches(doc))
        })
    }

    fn matching(&self, filter: &Filter) -> Scan {
        let plan = self.plan(filter);
        let (positions, keys_examined) = self.candidates(&plan);
        let documents = positions
            .iter()
            .filter_map(|p| self.documents.get(p))
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();

        Scan {
            plan,
            documents,
            docs_examined: positions.len(),
            keys_examined,
        }
    }

    fn scan_all(&self) -> Scan {
        Scan {
            plan: QueryPlan::CollectionScan,
            documents: self.documents.values().cloned().collect(),
            docs_examined: self.documents.len(),
            keys_examined: 0,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::query::{Projection, SortSpec};
    use crate::validation::FieldSchema;

    fn book(title: &str, author: &str, genre: &str, year: i64, price: f64) -> Document {
        doc! {
            "title": title,
            "author": author,
            "genre": genre,
            "published_year": year,
            "price": price,
            "in_stock": true,
        }
    }

    fn library() -> Collection {
        let books = Collection::new("books");
        books
            .insert_many(vec![
                book("Dune", "Frank Herbert", "Science Fiction", 1965, 9.99),
                book("Emma", "Jane Austen", "Romance", 1815, 7.5),
                book("Pride and Prejudice", "Jane Austen", "Romance", 1813, 8.25),
                book("The Hobbit", "J.R.R. Tolkien", "Fantasy", 1937, 12.0),
                book("Moby Dick", "Herman Melville", "Adventure", 1851, 11.0),
            ])
            .unwrap();
        books
    }

    fn filter(doc: Document) -> Filter {
        Filter::parse(&doc).unwrap()
    }

    fn titles(docs: &[Document]) -> Vec<&str> {
        docs.iter()
            .filter_map(|d| d.get("title").and_then(Value::as_str))
            .collect()
    }

    #[test]
    fn test_insert_assigns_leading_id() {
        let books = Collection::new("books");
        let id = books.insert(doc! { "title": "Dune" }).unwrap();

        let stored = books.get(&id).unwrap();
        assert_eq!(stored.keys().next(), Some("_id"));
        assert_eq!(stored.get("title"), Some(&Value::from("Dune")));
        assert_eq!(books.stats().documents_inserted, 1);
    }

    #[test]
    fn test_duplicate_id() {
        let books = Collection::new("books");
        books.insert(doc! { "_id": 1, "title": "Dune" }).unwrap();
        let err = books.insert(doc! { "_id": 1.0, "title": "Emma" }).unwrap_err();
        assert!(matches!(err, CollectionError::DuplicateId(_)));
        assert_eq!(books.len(), 1);

        let err = books
            .insert(doc! { "_id": vec![Value::from(1)] })
            .unwrap_err();
        assert!(matches!(err, CollectionError::InvalidDocument(_)));
    }

    #[test]
    fn test_find_sort_skip_limit_projection() {
        let books = library();
        let query = Query::new()
            .with_sort(SortSpec::parse(&doc! { "price": 1 }).unwrap())
            .with_skip(1)
            .with_limit(2)
            .with_projection(Projection::parse(&doc! { "title": 1, "_id": 0 }).unwrap());

        let result = books.find(&query).unwrap();
        assert_eq!(
            result.documents,
            vec![doc! { "title": "Pride and Prejudice" }, doc! { "title": "Dune" }]
        );
        assert_eq!(result.plan, QueryPlan::CollectionScan);
        assert_eq!(result.total_scanned, 5);
    }

    #[test]
    fn test_zero_limit_returns_everything() {
        let books = library();
        let result = books.find(&Query::new().with_skip(3).with_limit(0)).unwrap();
        assert_eq!(titles(&result.documents), vec!["The Hobbit", "Moby Dick"]);
    }

    #[test]
    fn test_index_plan_examines_fewer_documents() {
        let books = library();
        let spec = IndexSpec::parse(&doc! { "author": 1, "published_year": -1 }).unwrap();
        books.create_index(&spec).unwrap();

        let query = Query::new().with_filter(filter(doc! { "author": "Jane Austen" }));
        let result = books.find(&query).unwrap();
        assert_eq!(result.plan.index_name(), Some("author_1_published_year_-1"));
        assert_eq!(result.total_scanned, 2);
        assert_eq!(titles(&result.documents), vec!["Emma", "Pride and Prejudice"]);

        let query = Query::new().with_filter(filter(doc! { "published_year": 1815 }));
        assert_eq!(books.find(&query).unwrap().plan, QueryPlan::CollectionScan);
    }

    #[test]
    fn test_multikey_index_not_used() {
        let books = Collection::new("books");
        books
            .insert(doc! { "title": "Dune", "tags": vec![Value::from("classic"), Value::from("desert")] })
            .unwrap();
        books
            .create_index(&IndexSpec::parse(&doc! { "tags": 1 }).unwrap())
            .unwrap();

        let query = Query::new().with_filter(filter(doc! { "tags": "desert" }));
        let result = books.find(&query).unwrap();
        assert_eq!(result.plan, QueryPlan::CollectionScan);
        assert_eq!(result.count(), 1);
    }

    #[test]
    fn test_update_one() {
        let books = library();
        let result = books
            .update_one(
                &doc! { "title": "Moby Dick" },
                &doc! { "$set": doc! { "price": 15.5 } },
            )
            .unwrap();
        assert_eq!(result, UpdateResult { matched: 1, modified: 1 });
        let moby = books.find_one(&filter(doc! { "title": "Moby Dick" })).unwrap();
        assert_eq!(moby.get("price"), Some(&Value::Float(15.5)));

        let result = books
            .update_one(
                &doc! { "title": "Moby Dick" },
                &doc! { "$set": doc! { "price": 15.5 } },
            )
            .unwrap();
        assert_eq!(result, UpdateResult { matched: 1, modified: 0 });

        let result = books
            .update_one(
                &doc! { "title": "The Great Gatsby" },
                &doc! { "$set": doc! { "price": 15.5 } },
            )
            .unwrap();
        assert_eq!(result, UpdateResult::default());
        assert_eq!(books.stats().documents_updated, 1);
    }

    #[test]
    fn test_update_maintains_indexes() {
        let books = library();
        books
            .create_index(&IndexSpec::parse(&doc! { "title": 1 }).unwrap())
            .unwrap();
        books
            .update_one(
                &doc! { "title": "Emma" },
                &doc! { "$set": doc! { "title": "Emma (Annotated)" } },
            )
            .unwrap();

        assert_eq!(books.count(&filter(doc! { "title": "Emma" })), 0);
        assert_eq!(books.count(&filter(doc! { "title": "Emma (Annotated)" })), 1);
    }

    #[test]
    fn test_update_rejected_by_schema() {
        let schema = Schema::new("book").required("price", FieldSchema::number().min(0.0));
        let books = Collection::with_schema("books", schema);
        books.insert(doc! { "title": "Dune", "price": 9.99 }).unwrap();

        let err = books
            .update_one(&doc! { "title": "Dune" }, &doc! { "$set": doc! { "price": -1 } })
            .unwrap_err();
        assert!(matches!(err, CollectionError::ValidationFailed(_)));
        let dune = books.find_one(&Filter::all()).unwrap();
        assert_eq!(dune.get("price"), Some(&Value::Float(9.99)));

        assert!(books.insert(doc! { "title": "Free" }).is_err());
    }

    #[test]
    fn test_delete_one() {
        let books = library();
        let result = books.delete_one(&doc! { "author": "Jane Austen" }).unwrap();
        assert_eq!(result.deleted, 1);
        assert_eq!(titles(&books.all()), vec!["Dune", "Pride and Prejudice", "The Hobbit", "Moby Dick"]);

        let result = books.delete_one(&doc! { "title": "Emma" }).unwrap();
        assert_eq!(result.deleted, 0);
        assert_eq!(books.stats().documents_deleted, 1);
    }

    #[test]
    fn test_invalid_filter_is_query_error() {
        let books = library();
        let err = books.delete_one(&doc! { "price": doc! { "$near": 3 } }).unwrap_err();
        assert!(err.is_query_error());
        assert_eq!(books.len(), 5);
    }

    #[test]
    fn test_aggregate() {
        let books = library();
        let out = books
            .aggregate(&[
                doc! { "$match": doc! { "author": "Jane Austen" } },
                doc! { "$group": doc! { "_id": "$author", "count": doc! { "$sum": 1 } } },
            ])
            .unwrap();
        assert_eq!(out, vec![doc! { "_id": "Jane Austen", "count": 2 }]);
        assert_eq!(books.stats().aggregations_executed, 1);
    }

    #[test]
    fn test_create_index_idempotent_and_conflicts() {
        let books = library();
        let spec = IndexSpec::parse(&doc! { "title": 1 }).unwrap();
        let first = books.create_index(&spec).unwrap();
        let second = books.create_index(&spec).unwrap();
        assert_eq!(first, second);
        assert_eq!(books.list_indexes().len(), 2);

        let id = books
            .create_index(&IndexSpec::parse(&doc! { "_id": 1 }).unwrap())
            .unwrap();
        assert_eq!(id.name, "_id_");

        books
            .create_index(&IndexSpec::parse(&doc! { "a_1_b": 1 }).unwrap())
            .unwrap();
        let err = books
            .create_index(&IndexSpec::parse(&doc! { "a": 1, "b": 1 }).unwrap())
            .unwrap_err();
        assert!(matches!(err, CollectionError::IndexConflict(_)));
    }

    #[test]
    fn test_drop_index() {
        let books = library();
        books
            .create_index(&IndexSpec::parse(&doc! { "title": 1 }).unwrap())
            .unwrap();
        books.drop_index("title_1").unwrap();
        assert!(matches!(
            books.drop_index("title_1"),
            Err(CollectionError::IndexNotFound(_))
        ));
        assert!(books.drop_index("_id_").is_err());
        assert_eq!(books.list_indexes().len(), 1);
    }

    #[test]
    fn test_explain_find() {
        let books = library();
        books
            .create_index(&IndexSpec::parse(&doc! { "title": 1 }).unwrap())
            .unwrap();

        let target = ExplainTarget::find(doc! { "title": "Dune" });
        let report = books.explain(&target, ExplainMode::ExecutionStats).unwrap();
        assert_eq!(
            report.get("queryPlanner.winningPlan.inputStage.indexName"),
            Some(&Value::from("title_1"))
        );
        assert_eq!(report.get("executionStats.nReturned"), Some(&Value::Int(1)));
        assert_eq!(report.get("executionStats.totalDocsExamined"), Some(&Value::Int(1)));

        let report = books.explain(&target, ExplainMode::QueryPlanner).unwrap();
        assert!(report.get("executionStats").is_none());
    }

    #[test]
    fn test_explain_sorted_and_aggregate() {
        let books = library();
        let target = ExplainTarget::Find {
            filter: doc! { "author": "Jane Austen" },
            sort: Some(SortSpec::parse(&doc! { "published_year": -1 }).unwrap()),
        };
        let report = books.explain(&target, ExplainMode::ExecutionStats).unwrap();
        assert_eq!(report.get("queryPlanner.winningPlan.stage"), Some(&Value::from("SORT")));
        assert_eq!(
            report.get("queryPlanner.winningPlan.inputStage.stage"),
            Some(&Value::from("COLLSCAN"))
        );
        assert_eq!(report.get("executionStats.totalDocsExamined"), Some(&Value::Int(5)));

        let target = ExplainTarget::aggregate(vec![doc! { "$count": "n" }]);
        let report = books.explain(&target, ExplainMode::AllPlansExecution).unwrap();
        assert_eq!(report.get("stages"), Some(&Value::Array(vec![Value::from("$count")])));
        assert_eq!(report.get("executionStats.nReturned"), Some(&Value::Int(1)));
    }
}
