//! Folio Books Catalog
//!
//! The stock query catalog for the `books` collection, its schema and a
//! seed data set.
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::catalog::QueryCatalog;
use crate::definition::QueryDefinition;
use crate::error::CatalogResult;
use folio_document::{
    doc, Document, ExplainMode, FieldSchema, IndexSpec, Schema, SortKey, SortSpec, Value,
};

/// Schema every stored book must satisfy.
pub fn book_schema() -> Schema {
    let text = || FieldSchema::string().min_length(1);
    Schema::new("book")
        .required("title", text())
        .required("author", text())
        .required("genre", text())
        .required("published_year", FieldSchema::int())
        .required("price", FieldSchema::number().min(0.0))
        .required("in_stock", FieldSchema::bool())
}

fn book(title: &str, author: &str, genre: &str, year: i64, price: f64, in_stock: bool) -> Document {
    doc! {
        "title": title,
        "author": author,
        "genre": genre,
        "published_year": year,
        "price": price,
        "in_stock": in_stock,
    }
}

/// Twelve seed books with distinct prices.
pub fn sample_books() -> Vec<Document> {
    vec![
        book("Dune", "Frank Herbert", "Science Fiction", 1965, 9.99, true),
        book("Project Hail Mary", "Andy Weir", "Science Fiction", 2021, 18.99, true),
        book("The Martian", "Andy Weir", "Science Fiction", 2011, 14.25, false),
        book("Pride and Prejudice", "Jane Austen", "Romance", 1813, 7.99, true),
        book("Emma", "Jane Austen", "Romance", 1815, 8.5, true),
        book("Sense and Sensibility", "Jane Austen", "Romance", 1811, 6.75, false),
        book("The Great Gatsby", "F. Scott Fitzgerald", "Fiction", 1925, 10.99, true),
        book("Moby Dick", "Herman Melville", "Adventure", 1851, 12.5, false),
        book("The Hobbit", "J.R.R. Tolkien", "Fantasy", 1937, 14.99, true),
        book("The Name of the Wind", "Patrick Rothfuss", "Fantasy", 2007, 16.0, true),
        book("The Night Circus", "Erin Morgenstern", "Fantasy", 2011, 13.49, true),
        book("The Road", "Cormac McCarthy", "Fiction", 2006, 11.75, true),
    ]
}

fn sort(keys: Vec<SortKey>) -> SortSpec {
    SortSpec::new(keys)
}

/// Definitions of the books catalog, in catalog order.
pub fn book_definitions() -> Vec<QueryDefinition> {
    let by_price = || sort(vec![SortKey::ascending("price")]);
    let decade = doc! {
        "$subtract": vec![
            Value::from("$published_year"),
            Value::from(doc! { "$mod": vec![Value::from("$published_year"), Value::from(10)] }),
        ]
    };

    vec![
        // basic reads and writes
        QueryDefinition::find("find_by_genre")
            .with_filter(doc! { "genre": "Science Fiction" })
            .with_description("Books in a specific genre"),
        QueryDefinition::find("find_published_after_2000")
            .with_filter(doc! { "published_year": doc! { "$gt": 2000 } })
            .with_description("Books published after 2000"),
        QueryDefinition::find("find_by_author")
            .with_filter(doc! { "author": "Jane Austen" })
            .with_description("Books by a specific author"),
        QueryDefinition::update_one(
            "update_gatsby_price",
            doc! { "title": "The Great Gatsby" },
            doc! { "$set": doc! { "price": 15.50 } },
        )
        .with_description("Reprice The Great Gatsby"),
        QueryDefinition::delete_one("delete_moby_dick", doc! { "title": "Moby Dick" })
            .with_description("Delete a book by title"),
        // advanced queries
        QueryDefinition::find("find_in_stock_after_2010")
            .with_filter(doc! { "in_stock": true, "published_year": doc! { "$gt": 2010 } })
            .with_description("In stock and published after 2010"),
        QueryDefinition::find("find_fantasy_projection")
            .with_filter(doc! { "genre": "Fantasy" })
            .with_projection(doc! { "title": 1, "author": 1, "price": 1, "_id": 0 })
            .with_description("Title, author and price of fantasy books"),
        QueryDefinition::find("sort_by_price_asc")
            .with_sort(by_price())
            .with_description("All books, cheapest first"),
        QueryDefinition::find("sort_by_price_desc")
            .with_sort(by_price().reversed())
            .with_description("All books, most expensive first"),
        QueryDefinition::find("page_1")
            .with_limit(5)
            .with_skip(0)
            .with_description("First page of five books"),
        QueryDefinition::find("page_2")
            .with_limit(5)
            .with_skip(5)
            .with_description("Second page of five books"),
        // aggregation
        QueryDefinition::aggregate(
            "avg_price_by_genre",
            vec![
                doc! {
                    "$group": doc! {
                        "_id": "$genre",
                        "average_price": doc! { "$avg": "$price" },
                        "total_books": doc! { "$sum": 1 },
                    }
                },
                doc! { "$sort": doc! { "average_price": -1 } },
            ],
        )
        .with_description("Average price per genre"),
        QueryDefinition::aggregate(
            "top_author",
            vec![
                doc! { "$group": doc! { "_id": "$author", "book_count": doc! { "$sum": 1 } } },
                doc! { "$sort": doc! { "book_count": -1 } },
                doc! { "$limit": 1 },
            ],
        )
        .with_description("Author with the most books"),
        QueryDefinition::aggregate(
            "books_by_decade",
            vec![
                doc! { "$group": doc! { "_id": decade, "count": doc! { "$sum": 1 } } },
                doc! { "$project": doc! { "_id": 0, "decade_start": "$_id", "count": 1 } },
                doc! { "$sort": doc! { "decade_start": 1 } },
            ],
        )
        .with_description("Book counts per publication decade"),
        // indexing
        QueryDefinition::create_index(
            "create_title_index",
            IndexSpec::new(vec![SortKey::ascending("title")]),
        ),
        QueryDefinition::create_index(
            "create_author_year_index",
            IndexSpec::new(vec![
                SortKey::ascending("author"),
                SortKey::descending("published_year"),
            ]),
        ),
        QueryDefinition::list_indexes("list_indexes"),
        QueryDefinition::explain("explain_title_lookup", doc! { "title": "The Name of the Wind" })
            .with_explain_mode(ExplainMode::ExecutionStats)
            .with_description("Plan of a title lookup"),
        QueryDefinition::explain("explain_author_sorted", doc! { "author": "Jane Austen" })
            .with_sort(sort(vec![SortKey::descending("published_year")]))
            .with_explain_mode(ExplainMode::ExecutionStats)
            .with_description("Plan of an author lookup sorted by year"),
    ]
}

/// The books catalog.
pub fn books_catalog() -> CatalogResult<QueryCatalog> {
    QueryCatalog::from_definitions(book_definitions())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_books_fit_schema() {
        let schema = book_schema();
        for book in sample_books() {
            assert!(schema.validate(&book).is_ok(), "{:?}", book.get("title"));
        }
        assert!(schema.validate(&doc! { "title": "" }).is_err());
    }

    #[test]
    fn test_catalog_order() {
        let catalog = books_catalog().unwrap();
        assert_eq!(catalog.len(), 19);
        assert_eq!(catalog.names().next(), Some("find_by_genre"));
        assert_eq!(catalog.names().last(), Some("explain_author_sorted"));
    }
}
