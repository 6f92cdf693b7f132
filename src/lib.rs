//! Bookshelf - named queries over a local book document store
//!
//! [`BookCatalog`] exposes the catalog operations; any [`DocumentStore`]
//! can back it, and [`NoSqlEngine`] is the embedded file-based store.

pub mod engine;

pub use engine::catalog::{
    AuthorSummary, Book, BookCatalog, BookRecord, Books, CatalogError, GenreSummary,
};
pub use engine::config::{Config, ConfigError};
pub use engine::nosql::{DocumentStore, ErrorKind, IndexAck, NoSqlEngine, NoSqlError, UpdateResult};
