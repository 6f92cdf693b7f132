//! NoSQL Storage Engine
//!
//! Main entry point for the NoSQL engine

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::instrument;

use super::collection::{validate_collection_name, Collection};
use super::cursor::Cursor;
use super::document::Document;
use super::error::{NoSqlError, Result};
use super::filter::Filter;
use super::meta::Meta;
use super::pipeline::Pipeline;
use super::query::FindQuery;
use super::store::{DocumentStore, IndexAck};
use super::text::TextIndexSpec;
use super::update::{Update, UpdateResult};

/// The main NoSQL storage engine
pub struct NoSqlEngine {
    /// Base path for NoSQL storage
    base_path: PathBuf,

    /// Metadata for this store
    meta: Meta,

    /// Readers share, writers serialize
    lock: RwLock<()>,
}

impl NoSqlEngine {
    /// Open an existing NoSQL store
    pub fn open(path: &Path) -> Result<Self> {
        let nosql_path = path.join("nosql");

        if !nosql_path.exists() {
            return Err(NoSqlError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "NoSQL store not found",
            )));
        }

        let meta = Meta::load(&nosql_path)?;

        Ok(Self::with_meta(nosql_path, meta))
    }

    /// Create a new NoSQL store
    pub fn create(path: &Path) -> Result<Self> {
        let nosql_path = path.join("nosql");

        fs::create_dir_all(&nosql_path)?;

        let meta = Meta::new();
        meta.save(&nosql_path)?;

        Ok(Self::with_meta(nosql_path, meta))
    }

    /// Open or create a NoSQL store
    pub fn open_or_create(path: &Path) -> Result<Self> {
        let nosql_path = path.join("nosql");

        if nosql_path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    fn with_meta(base_path: PathBuf, meta: Meta) -> Self {
        Self {
            base_path,
            meta,
            lock: RwLock::new(()),
        }
    }

    /// Get metadata
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Create a new collection
    pub fn create_collection(&self, name: &str) -> Result<Collection> {
        let _guard = self.write_guard();
        Collection::create(&self.base_path, name)
    }

    /// Open an existing collection
    pub fn collection(&self, name: &str) -> Result<Collection> {
        Collection::open(&self.base_path, name)
    }

    /// List all collections
    pub fn list_collections(&self) -> Result<Vec<String>> {
        let mut collections = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                if let Some(name) = path.file_name() {
                    let name_str = name.to_string_lossy();
                    // Skip hidden directories
                    if !name_str.starts_with('.') && !name_str.starts_with('_') {
                        collections.push(name_str.to_string());
                    }
                }
            }
        }

        collections.sort();
        Ok(collections)
    }

    /// Drop a collection
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let _guard = self.write_guard();
        let collection = self.collection(name)?;
        collection.drop()
    }

    /// Check if a collection exists
    pub fn collection_exists(&self, name: &str) -> bool {
        validate_collection_name(name).is_ok() && self.base_path.join(name).exists()
    }

    // ========== Convenience Methods ==========

    /// Insert a document, creating the collection on first use
    pub fn insert(&self, collection: &str, doc: Document) -> Result<String> {
        let _guard = self.write_guard();
        Collection::open_or_create(&self.base_path, collection)?.insert(doc)
    }

    /// Insert several documents, creating the collection on first use
    pub fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<String>> {
        let _guard = self.write_guard();
        Collection::open_or_create(&self.base_path, collection)?.insert_many(docs)
    }

    /// Get a document by ID
    pub fn get(&self, collection: &str, id: &str) -> Result<Document> {
        let _guard = self.read_guard();
        self.collection(collection)?.get(id)
    }

    /// Update every document matching a filter
    #[instrument(level = "debug", skip(self, filter, update))]
    pub fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult> {
        let _guard = self.write_guard();
        match self.existing(collection)? {
            Some(col) => col.update_many(filter, update),
            None => Self::empty_update(filter, update),
        }
    }

    /// Remove a collection's text index
    pub fn drop_text_index(&self, collection: &str) -> Result<bool> {
        let _guard = self.write_guard();
        match self.existing(collection)? {
            Some(col) => col.drop_text_index(),
            None => Ok(false),
        }
    }

    /// Missing collections behave as empty ones for reads and updates
    fn existing(&self, name: &str) -> Result<Option<Collection>> {
        validate_collection_name(name)?;
        if self.base_path.join(name).exists() {
            Ok(Some(self.collection(name)?))
        } else {
            Ok(None)
        }
    }

    fn empty_update(filter: &Filter, update: &Update) -> Result<UpdateResult> {
        update.validate()?;
        filter.compile()?;
        Ok(UpdateResult::default())
    }

    // A poisoned lock only means another caller panicked mid-operation;
    // documents on disk are still whole files.
    fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentStore for NoSqlEngine {
    #[instrument(level = "debug", skip(self, query))]
    fn find(&self, collection: &str, query: &FindQuery) -> Result<Cursor> {
        let _guard = self.read_guard();
        let docs = match self.existing(collection)? {
            Some(col) => col.find(query)?,
            None => query.execute(collection, Vec::new(), None)?,
        };
        Ok(Cursor::new(docs))
    }

    #[instrument(level = "debug", skip(self, filter))]
    fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let _guard = self.read_guard();
        match self.existing(collection)? {
            Some(col) => col.count(filter),
            None => {
                FindQuery::new(filter.clone()).execute(collection, Vec::new(), None)?;
                Ok(0)
            }
        }
    }

    #[instrument(level = "debug", skip(self, filter, update))]
    fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> Result<UpdateResult> {
        let _guard = self.write_guard();
        match self.existing(collection)? {
            Some(col) => col.update_one(filter, update),
            None => Self::empty_update(filter, update),
        }
    }

    #[instrument(level = "debug", skip(self, spec))]
    fn create_index(&self, collection: &str, spec: &TextIndexSpec) -> Result<IndexAck> {
        let _guard = self.write_guard();
        Collection::open_or_create(&self.base_path, collection)?.create_text_index(spec)
    }

    #[instrument(level = "debug", skip(self, pipeline))]
    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>> {
        let _guard = self.read_guard();
        match self.existing(collection)? {
            Some(col) => col.aggregate(pipeline),
            None => pipeline.execute(collection, Vec::new(), None),
        }
    }
}
