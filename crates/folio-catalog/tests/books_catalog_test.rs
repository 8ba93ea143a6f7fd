//! Integration tests for the books catalog against the in-memory collection.

use folio_catalog::{
    book_schema, books_catalog, sample_books, CatalogError, ExecutionOutput, QueryCatalog,
    QueryDefinition, QueryKind, Store, StoreError,
};
use folio_document::{
    doc, Collection, DeleteResult, Document, ExplainMode, ExplainTarget, IndexDescriptor,
    IndexSpec, SortKey, SortSpec, UpdateResult, Value,
};
use parking_lot::Mutex;
use std::collections::HashSet;

fn seeded() -> Collection {
    let books = Collection::with_schema("books", book_schema());
    books.insert_many(sample_books()).unwrap();
    books
}

fn documents(catalog: &QueryCatalog, name: &str, store: &dyn Store) -> Vec<Document> {
    catalog
        .execute(name, store)
        .unwrap()
        .into_cursor()
        .unwrap()
        .collect()
}

fn titles(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .filter_map(|d| d.get("title").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[test]
fn test_get_returns_matching_name() {
    let catalog = books_catalog().unwrap();
    for name in catalog.names() {
        assert_eq!(catalog.get(name).unwrap().name, name);
    }
}

#[test]
fn test_duplicate_registration_leaves_catalog_unchanged() {
    let mut catalog = books_catalog().unwrap();
    let before = catalog.to_json_string().unwrap();

    let duplicate = QueryDefinition::find("find_by_genre").with_filter(doc! { "genre": "Romance" });
    assert!(matches!(
        catalog.register(duplicate),
        Err(CatalogError::DuplicateName(name)) if name == "find_by_genre"
    ));
    assert_eq!(catalog.len(), 19);
    assert_eq!(catalog.to_json_string().unwrap(), before);
    assert_eq!(
        catalog.get("find_by_genre").unwrap().filter,
        Some(doc! { "genre": "Science Fiction" })
    );
}

#[test]
fn test_price_sorts_are_reversed() {
    let catalog = books_catalog().unwrap();
    let books = seeded();

    let ascending = documents(&catalog, "sort_by_price_asc", &books);
    let mut descending = documents(&catalog, "sort_by_price_desc", &books);
    assert_eq!(ascending.len(), 12);
    assert_eq!(titles(&ascending)[0], "Sense and Sensibility");

    descending.reverse();
    assert_eq!(ascending, descending);
}

#[test]
fn test_pages_partition_ten_books() {
    let books = Collection::new("books");
    books.insert_many(sample_books().into_iter().take(10)).unwrap();
    let catalog = books_catalog().unwrap();

    let first = documents(&catalog, "page_1", &books);
    let second = documents(&catalog, "page_2", &books);
    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 5);

    let first_ids: HashSet<String> = first.iter().map(|d| format!("{:?}", d.id())).collect();
    let second_ids: HashSet<String> = second.iter().map(|d| format!("{:?}", d.id())).collect();
    assert!(first_ids.is_disjoint(&second_ids));

    let mut pages = first;
    pages.extend(second);
    assert_eq!(pages, books.all());
}

#[test]
fn test_group_by_genre_average_and_count() {
    let books = Collection::new("books");
    books
        .insert_many(vec![
            doc! { "genre": "SciFi", "price": 10 },
            doc! { "genre": "SciFi", "price": 20 },
            doc! { "genre": "Fantasy", "price": 5 },
        ])
        .unwrap();
    let catalog = books_catalog().unwrap();

    let groups = documents(&catalog, "avg_price_by_genre", &books);
    assert_eq!(
        groups,
        vec![
            doc! { "_id": "SciFi", "average_price": 15.0, "total_books": 2 },
            doc! { "_id": "Fantasy", "average_price": 5.0, "total_books": 1 },
        ]
    );
}

#[test]
fn test_update_missing_title_matches_nothing() {
    let books = Collection::new("books");
    books
        .insert(doc! { "title": "Dune", "price": 9.99 })
        .unwrap();
    let catalog = books_catalog().unwrap();

    let output = catalog.execute("update_gatsby_price", &books).unwrap();
    assert!(matches!(
        output,
        ExecutionOutput::Updated(UpdateResult { matched: 0, modified: 0 })
    ));
}

#[test]
fn test_create_index_twice_same_keys() {
    let catalog = books_catalog().unwrap();
    let books = seeded();

    let key_of = |output: ExecutionOutput| match output {
        ExecutionOutput::IndexCreated(descriptor) => descriptor,
        other => panic!("unexpected output: {other:?}"),
    };
    let first = key_of(catalog.execute("create_author_year_index", &books).unwrap());
    let second = key_of(catalog.execute("create_author_year_index", &books).unwrap());
    assert_eq!(first.key, second.key);
    assert_eq!(first.name, "author_1_published_year_-1");
    assert_eq!(books.list_indexes().len(), 2);
}

#[test]
fn test_books_catalog_end_to_end() {
    let catalog = books_catalog().unwrap();
    let books = seeded();

    let scifi = documents(&catalog, "find_by_genre", &books);
    assert_eq!(titles(&scifi), vec!["Dune", "Project Hail Mary", "The Martian"]);

    let recent = documents(&catalog, "find_published_after_2000", &books);
    assert_eq!(recent.len(), 5);

    let austen = documents(&catalog, "find_by_author", &books);
    assert_eq!(
        titles(&austen),
        vec!["Pride and Prejudice", "Emma", "Sense and Sensibility"]
    );

    let updated = catalog.execute("update_gatsby_price", &books).unwrap();
    assert!(matches!(
        updated,
        ExecutionOutput::Updated(UpdateResult { matched: 1, modified: 1 })
    ));
    let gatsby = books
        .all()
        .into_iter()
        .find(|d| d.get("title") == Some(&Value::from("The Great Gatsby")))
        .unwrap();
    assert_eq!(gatsby.get("price"), Some(&Value::from(15.5)));

    let deleted = catalog.execute("delete_moby_dick", &books).unwrap();
    assert!(matches!(deleted, ExecutionOutput::Deleted(DeleteResult { deleted: 1 })));
    assert_eq!(books.len(), 11);

    let in_stock = documents(&catalog, "find_in_stock_after_2010", &books);
    assert_eq!(titles(&in_stock), vec!["Project Hail Mary", "The Night Circus"]);

    let fantasy = documents(&catalog, "find_fantasy_projection", &books);
    assert_eq!(
        fantasy[0],
        doc! { "title": "The Hobbit", "author": "J.R.R. Tolkien", "price": 14.99 }
    );

    let top = documents(&catalog, "top_author", &books);
    assert_eq!(top, vec![doc! { "_id": "Jane Austen", "book_count": 3 }]);

    let decades = documents(&catalog, "books_by_decade", &books);
    assert_eq!(decades[0], doc! { "decade_start": 1810, "count": 3 });
    assert_eq!(decades.last(), Some(&doc! { "decade_start": 2020, "count": 1 }));
}

#[test]
fn test_explain_uses_created_indexes() {
    let catalog = books_catalog().unwrap();
    let books = seeded();

    let report = |name: &str| match catalog.execute(name, &books).unwrap() {
        ExecutionOutput::Report(report) => report,
        other => panic!("unexpected output: {other:?}"),
    };

    let before = report("explain_title_lookup");
    assert_eq!(
        before.get("queryPlanner.winningPlan.stage"),
        Some(&Value::from("COLLSCAN"))
    );
    assert_eq!(before.get("executionStats.nReturned"), Some(&Value::from(1)));

    catalog.execute("create_title_index", &books).unwrap();
    catalog.execute("create_author_year_index", &books).unwrap();

    let after = report("explain_title_lookup");
    assert_eq!(
        after.get("queryPlanner.winningPlan.inputStage.indexName"),
        Some(&Value::from("title_1"))
    );
    assert_eq!(after.get("executionStats.totalDocsExamined"), Some(&Value::from(1)));

    let sorted = report("explain_author_sorted");
    assert_eq!(
        sorted.get("queryPlanner.winningPlan.stage"),
        Some(&Value::from("SORT"))
    );
    assert_eq!(
        sorted.get("queryPlanner.winningPlan.inputStage.inputStage.indexName"),
        Some(&Value::from("author_1_published_year_-1"))
    );

    let indexes = catalog.execute("list_indexes", &books).unwrap();
    match indexes {
        ExecutionOutput::Indexes(descriptors) => {
            let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
            assert_eq!(names, vec!["_id_", "title_1", "author_1_published_year_-1"]);
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

#[test]
fn test_run_all_books_queries() {
    let catalog = books_catalog().unwrap();
    let books = seeded();

    let outputs = catalog.execute_all(&books).unwrap();
    let names: Vec<_> = outputs.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, catalog.names().collect::<Vec<_>>());

    for (name, output) in outputs {
        let json = output.into_json().unwrap();
        assert!(!json.is_null(), "{name} produced null");
    }
}

// =============================================================================
// Injected Store
// =============================================================================

/// Store that records calls and fails on request.
#[derive(Default)]
struct RecordingStore {
    calls: Mutex<Vec<&'static str>>,
    fail: bool,
}

impl RecordingStore {
    fn record(&self, call: &'static str) -> Result<(), StoreError> {
        self.calls.lock().push(call);
        if self.fail {
            return Err(StoreError::new("store unavailable"));
        }
        Ok(())
    }
}

impl Store for RecordingStore {
    fn find(&self, _: &Document, _: Option<&Document>) -> Result<Vec<Document>, StoreError> {
        self.record("find")?;
        Ok(vec![doc! { "price": 2 }, doc! { "price": 1 }, doc! { "price": 3 }])
    }

    fn update_one(&self, _: &Document, _: &Document) -> Result<UpdateResult, StoreError> {
        self.record("update_one")?;
        Ok(UpdateResult::default())
    }

    fn delete_one(&self, _: &Document) -> Result<DeleteResult, StoreError> {
        self.record("delete_one")?;
        Ok(DeleteResult::default())
    }

    fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>, StoreError> {
        self.record("aggregate")?;
        Ok(pipeline.to_vec())
    }

    fn create_index(&self, spec: &IndexSpec) -> Result<IndexDescriptor, StoreError> {
        self.record("create_index")?;
        Ok(IndexDescriptor::new(spec.clone()))
    }

    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, StoreError> {
        self.record("list_indexes")?;
        Ok(Vec::new())
    }

    fn explain(&self, target: &ExplainTarget, mode: ExplainMode) -> Result<Document, StoreError> {
        self.record("explain")?;
        let kind = match target {
            ExplainTarget::Find { .. } => "find",
            ExplainTarget::Aggregate { .. } => "aggregate",
        };
        Ok(doc! { "target": kind, "verbosity": mode.as_str() })
    }
}

#[test]
fn test_catalog_sorts_and_pages_over_any_store() {
    let catalog = QueryCatalog::from_definitions(vec![QueryDefinition::find("cheapest")
        .with_sort(SortSpec::new(vec![SortKey::ascending("price")]))
        .with_skip(1)
        .with_limit(1)])
    .unwrap();
    let store = RecordingStore::default();

    let docs = documents(&catalog, "cheapest", &store);
    assert_eq!(docs, vec![doc! { "price": 2 }]);
    assert_eq!(*store.calls.lock(), vec!["find"]);
}

#[test]
fn test_explain_report_returned_unchanged() {
    let catalog = QueryCatalog::from_definitions(vec![
        QueryDefinition::explain("by_title", doc! { "title": "Emma" }),
        QueryDefinition::explain_pipeline("by_genre", vec![doc! { "$limit": 1 }])
            .with_explain_mode(ExplainMode::QueryPlanner),
    ])
    .unwrap()
    .with_default_explain_mode(ExplainMode::AllPlansExecution);
    let store = RecordingStore::default();

    let report = catalog.execute("by_title", &store).unwrap().into_json().unwrap();
    assert_eq!(
        report,
        serde_json::json!({ "target": "find", "verbosity": "allPlansExecution" })
    );
    let report = catalog.execute("by_genre", &store).unwrap().into_json().unwrap();
    assert_eq!(
        report,
        serde_json::json!({ "target": "aggregate", "verbosity": "queryPlanner" })
    );
}

#[test]
fn test_store_errors_propagate_unchanged() {
    let catalog = books_catalog().unwrap();
    let store = RecordingStore {
        fail: true,
        ..Default::default()
    };

    for definition in catalog.iter() {
        let err = catalog.execute(&definition.name, &store).unwrap_err();
        match err {
            CatalogError::Store(err) => assert_eq!(err.message(), "store unavailable"),
            other => panic!("{}: unexpected error {other:?}", definition.name),
        }
    }
    assert_eq!(store.calls.lock().len(), catalog.len());

    let mutations = catalog.iter().filter(|d| d.kind.is_mutation()).count();
    assert!(mutations >= 2);
    assert_eq!(
        catalog.iter().filter(|d| d.kind == QueryKind::Explain).count(),
        2
    );
}

#[test]
fn test_not_found() {
    let catalog = books_catalog().unwrap();
    let books = seeded();
    assert!(matches!(
        catalog.execute("find_by_isbn", &books),
        Err(CatalogError::NotFound(name)) if name == "find_by_isbn"
    ));
}
