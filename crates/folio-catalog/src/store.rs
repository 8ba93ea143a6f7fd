//! Folio Store - Document Store Capability
//!
//! The operations the catalog needs from a document store, and the
//! implementation for the in-memory [`Collection`].
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::StoreError;
use folio_document::{
    Collection, CollectionError, DeleteResult, Document, ExplainMode, ExplainTarget,
    IndexDescriptor, IndexSpec, Query, UpdateResult,
};

// =============================================================================
// Store Trait
// =============================================================================

/// Document store interface the catalog executes against.
pub trait Store: Send + Sync {
    /// Documents matching `filter` in natural order, projected when a
    /// projection is given.
    fn find(
        &self,
        filter: &Document,
        projection: Option<&Document>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Update the first document matching `filter`.
    fn update_one(&self, filter: &Document, update: &Document) -> Result<UpdateResult, StoreError>;

    /// Delete the first document matching `filter`.
    fn delete_one(&self, filter: &Document) -> Result<DeleteResult, StoreError>;

    /// Run an aggregation pipeline.
    fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>, StoreError>;

    /// Create an index and return its descriptor.
    fn create_index(&self, spec: &IndexSpec) -> Result<IndexDescriptor, StoreError>;

    /// Describe the existing indexes.
    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, StoreError>;

    /// Produce a store-defined report on how `target` executes.
    fn explain(&self, target: &ExplainTarget, mode: ExplainMode) -> Result<Document, StoreError>;
}

// =============================================================================
// Collection Store
// =============================================================================

impl Store for Collection {
    fn find(
        &self,
        filter: &Document,
        projection: Option<&Document>,
    ) -> Result<Vec<Document>, StoreError> {
        let query = Query::from_documents(filter, projection).map_err(CollectionError::from)?;
        Ok(Collection::find(self, &query)?.documents)
    }

    fn update_one(&self, filter: &Document, update: &Document) -> Result<UpdateResult, StoreError> {
        Ok(Collection::update_one(self, filter, update)?)
    }

    fn delete_one(&self, filter: &Document) -> Result<DeleteResult, StoreError> {
        Ok(Collection::delete_one(self, filter)?)
    }

    fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>, StoreError> {
        Ok(Collection::aggregate(self, pipeline)?)
    }

    fn create_index(&self, spec: &IndexSpec) -> Result<IndexDescriptor, StoreError> {
        Ok(Collection::create_index(self, spec)?)
    }

    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, StoreError> {
        Ok(Collection::list_indexes(self))
    }

    fn explain(&self, target: &ExplainTarget, mode: ExplainMode) -> Result<Document, StoreError> {
        Ok(Collection::explain(self, target, mode)?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use folio_document::{doc, QueryError, Value};

    fn store() -> Collection {
        let books = Collection::new("books");
        books
            .insert_many(vec![
                doc! { "_id": 1, "title": "Dune", "price": 9.99 },
                doc! { "_id": 2, "title": "Emma", "price": 7.5 },
            ])
            .unwrap();
        books
    }

    #[test]
    fn test_find_through_trait() {
        let store: &dyn Store = &store();
        let docs = store
            .find(&doc! {}, Some(&doc! { "title": 1, "_id": 0 }))
            .unwrap();
        assert_eq!(docs, vec![doc! { "title": "Dune" }, doc! { "title": "Emma" }]);
    }

    #[test]
    fn test_errors_become_store_errors() {
        let store: &dyn Store = &store();
        let err = store
            .find(&doc! { "price": doc! { "$between": 1 } }, None)
            .unwrap_err();
        assert!(matches!(
            err.collection_error(),
            Some(CollectionError::Query(QueryError::UnsupportedOperator(_)))
        ));

        let err = store
            .aggregate(&[doc! { "$project": doc! { "ratio": doc! { "$divide": vec![
                Value::from("$price"),
                Value::from(0),
            ] } } }])
            .unwrap_err();
        assert_eq!(err.message(), "division by zero");
    }

    #[test]
    fn test_writes_through_trait() {
        let books = store();
        let store: &dyn Store = &books;
        let updated = store
            .update_one(&doc! { "_id": 2 }, &doc! { "$inc": doc! { "price": 1 } })
            .unwrap();
        assert_eq!(updated, UpdateResult { matched: 1, modified: 1 });
        assert_eq!(store.delete_one(&doc! { "_id": 1 }).unwrap().deleted, 1);
        assert_eq!(books.len(), 1);
    }
}
