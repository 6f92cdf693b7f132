//! Bookshelf NoSQL Engine
//!
//! A document-based JSON storage engine with:
//! - Typed filter, update and aggregation expressions
//! - A single text index per collection with relevance scoring
//! - Time-ordered document IDs
//! - Format versioning for safe updates

pub mod collection;
pub mod cursor;
pub mod document;
pub mod error;
pub mod filter;
pub mod meta;
pub mod pipeline;
pub mod query;
pub mod storage;
pub mod store;
pub mod text;
pub mod update;

pub use collection::Collection;
pub use cursor::Cursor;
pub use document::Document;
pub use error::{ErrorKind, NoSqlError};
pub use filter::{FieldOp, Filter};
pub use meta::Meta;
pub use pipeline::{Accumulator, GroupStage, Operand, Pipeline, Projection, Stage};
pub use query::{FindQuery, SortKey, SortOrder};
pub use storage::NoSqlEngine;
pub use store::{DocumentStore, IndexAck};
pub use text::{TextIndex, TextIndexSpec, TextSearch};
pub use update::{Update, UpdateResult};
