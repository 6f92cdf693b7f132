//! Document store interface
//!
//! The operations a query catalog needs from a document database. The
//! embedded [`NoSqlEngine`](super::NoSqlEngine) implements it; other backends
//! can be plugged in behind the same trait.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cursor::Cursor;
use super::error::Result;
use super::filter::Filter;
use super::pipeline::Pipeline;
use super::query::FindQuery;
use super::text::TextIndexSpec;
use super::update::{Update, UpdateResult};

/// Acknowledgement returned by index creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAck {
    pub name: String,
    /// `false` when an equivalent index already existed
    pub created: bool,
}

/// Blocking document-store client.
///
/// Each call is one independent round trip. Implementations decide
/// consistency between concurrent callers.
pub trait DocumentStore: Send + Sync {
    /// Find documents matching a query
    fn find(&self, collection: &str, query: &FindQuery) -> Result<Cursor>;

    /// Count documents matching a filter
    fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Update the first document matching a filter
    fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> Result<UpdateResult>;

    /// Create a text index; equivalent definitions are a no-op
    fn create_index(&self, collection: &str, spec: &TextIndexSpec) -> Result<IndexAck>;

    /// Run an aggregation pipeline
    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn find(&self, collection: &str, query: &FindQuery) -> Result<Cursor> {
        (**self).find(collection, query)
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        (**self).count(collection, filter)
    }

    fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> Result<UpdateResult> {
        (**self).update_one(collection, filter, update)
    }

    fn create_index(&self, collection: &str, spec: &TextIndexSpec) -> Result<IndexAck> {
        (**self).create_index(collection, spec)
    }

    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>> {
        (**self).aggregate(collection, pipeline)
    }
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn find(&self, collection: &str, query: &FindQuery) -> Result<Cursor> {
        (**self).find(collection, query)
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        (**self).count(collection, filter)
    }

    fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> Result<UpdateResult> {
        (**self).update_one(collection, filter, update)
    }

    fn create_index(&self, collection: &str, spec: &TextIndexSpec) -> Result<IndexAck> {
        (**self).create_index(collection, spec)
    }

    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>> {
        (**self).aggregate(collection, pipeline)
    }
}
