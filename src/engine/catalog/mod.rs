//! Book Query Catalog
//!
//! A fixed set of named read, update and aggregate operations over the
//! `books` collection, executed through an injected [`DocumentStore`].

pub mod book;
pub mod error;
pub mod queries;

use tracing::{debug, instrument};

use crate::engine::config::Config;
use crate::engine::nosql::{Cursor, DocumentStore, IndexAck, TextIndexSpec, UpdateResult};

pub use book::{AuthorSummary, Book, BookRecord, GenreSummary};
pub use error::{CatalogError, Result};

/// Lazily decoded books from a find
#[derive(Debug)]
pub struct Books {
    cursor: Cursor,
    score_field: Option<&'static str>,
}

impl Books {
    fn new(cursor: Cursor) -> Self {
        Self {
            cursor,
            score_field: None,
        }
    }

    fn scored(cursor: Cursor) -> Self {
        Self {
            cursor,
            score_field: Some(queries::SCORE_FIELD),
        }
    }
}

impl Iterator for Books {
    type Item = Result<BookRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = self.cursor.next()?;
        Some(BookRecord::from_document(doc, self.score_field))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.cursor.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Books {}

/// Query catalog bound to one store client and collection
pub struct BookCatalog<S> {
    store: S,
    collection: String,
    text_index: TextIndexSpec,
}

impl<S: DocumentStore> BookCatalog<S> {
    /// Catalog over the `books` collection
    pub fn new(store: S) -> Self {
        Self::with_collection(store, "books")
    }

    pub fn with_collection(store: S, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            text_index: queries::text_index(),
        }
    }

    /// Collection and text index weights from project configuration
    pub fn from_config(store: S, config: &Config) -> Self {
        Self {
            store,
            collection: config.store.collection.clone(),
            text_index: config.text_index.spec(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every book, in natural order
    pub fn all_books(&self) -> Result<Books> {
        let cursor = self.store.find(&self.collection, &queries::all_books())?;
        Ok(Books::new(cursor))
    }

    /// Books whose author equals `author` exactly
    pub fn books_by_author(&self, author: &str) -> Result<Books> {
        let cursor = self.store.find(&self.collection, &queries::by_author(author))?;
        Ok(Books::new(cursor))
    }

    pub fn in_stock_books(&self) -> Result<Books> {
        let cursor = self.store.find(&self.collection, &queries::in_stock())?;
        Ok(Books::new(cursor))
    }

    pub fn count_in_stock(&self) -> Result<u64> {
        Ok(self
            .store
            .count(&self.collection, &queries::in_stock_filter())?)
    }

    /// Books published in `min_year..=max_year`, oldest first
    pub fn books_published_between(&self, min_year: i32, max_year: i32) -> Result<Books> {
        if min_year > max_year {
            return Err(CatalogError::InvalidInput(format!(
                "year range {}..={} is empty",
                min_year, max_year
            )));
        }
        let query = queries::published_between(min_year, max_year);
        let cursor = self.store.find(&self.collection, &query)?;
        Ok(Books::new(cursor))
    }

    /// Books whose title matches `pattern` anywhere, ignoring case
    pub fn books_with_title_matching(&self, pattern: &str) -> Result<Books> {
        let cursor = self
            .store
            .find(&self.collection, &queries::title_matching(pattern))?;
        Ok(Books::new(cursor))
    }

    /// Set the price of the first book titled exactly `title`
    #[instrument(level = "debug", skip(self), fields(collection = %self.collection))]
    pub fn update_price(&self, title: &str, new_price: f64) -> Result<UpdateResult> {
        book::validate_price(new_price)?;
        let result = self.store.update_one(
            &self.collection,
            &queries::title_is(title),
            &queries::set_price(new_price),
        )?;
        debug!(
            matched = result.matched_count,
            modified = result.modified_count,
            "price update"
        );
        Ok(result)
    }

    /// Mean price, count and page total per genre, cheapest first
    pub fn genre_summaries(&self) -> Result<Vec<GenreSummary>> {
        let rows = self
            .store
            .aggregate(&self.collection, &queries::genre_summary())?;
        book::decode_rows(rows)
    }

    /// Authors with more than one book, highest average price first
    pub fn prolific_authors(&self) -> Result<Vec<AuthorSummary>> {
        let rows = self
            .store
            .aggregate(&self.collection, &queries::prolific_authors())?;
        book::decode_rows(rows)
    }

    /// Declare the free-text index; repeating it is a no-op
    pub fn create_text_index(&self) -> Result<IndexAck> {
        Ok(self.store.create_index(&self.collection, &self.text_index)?)
    }

    /// Books matching `text`, most relevant first, each with its score
    pub fn search(&self, text: &str) -> Result<Books> {
        let cursor = self.store.find(&self.collection, &queries::search(text))?;
        Ok(Books::scored(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::nosql::NoSqlEngine;
    use tempfile::tempdir;

    #[test]
    fn test_from_config() {
        let dir = tempdir().unwrap();
        let engine = NoSqlEngine::create(dir.path()).unwrap();

        let mut config = Config::default_for_project("library");
        config.store.collection = "novels".to_string();
        config.text_index.weights.insert("title".to_string(), 5);

        let catalog = BookCatalog::from_config(&engine, &config);
        assert_eq!(catalog.collection(), "novels");
        assert!(!catalog.store().collection_exists("novels"));
        assert_eq!(catalog.all_books().unwrap().len(), 0);

        let ack = catalog.create_text_index().unwrap();
        assert!(ack.created);
        let stored = engine.collection("novels").unwrap().text_index().unwrap().unwrap();
        assert_eq!(stored.spec.fields.get("title"), Some(&5));
    }

    #[test]
    fn test_invalid_inputs() {
        let dir = tempdir().unwrap();
        let engine = NoSqlEngine::create(dir.path()).unwrap();
        let catalog = BookCatalog::new(&engine);

        assert!(matches!(
            catalog.books_published_between(1970, 1939),
            Err(CatalogError::InvalidInput(_))
        ));
        assert!(matches!(
            catalog.update_price("Dune", -5.0),
            Err(CatalogError::InvalidInput(_))
        ));
        let err = catalog.books_with_title_matching("(").unwrap_err();
        assert_eq!(err.kind(), crate::engine::nosql::ErrorKind::InvalidInput);
    }
}
