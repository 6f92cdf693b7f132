//! Collection management for NoSQL storage

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::document::Document;
use super::error::{NoSqlError, Result};
use super::filter::Filter;
use super::meta::{check_layout, INDEX_LAYOUT};
use super::pipeline::Pipeline;
use super::query::FindQuery;
use super::store::IndexAck;
use super::text::{TextIndex, TextIndexSpec};
use super::update::{Update, UpdateResult};

const INDEX_FILE: &str = "_indexes.json";

/// Index metadata stored next to the documents
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexCatalog {
    layout: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<TextIndex>,
}

impl Default for IndexCatalog {
    fn default() -> Self {
        Self {
            layout: INDEX_LAYOUT,
            text: None,
        }
    }
}

/// A NoSQL collection (like a table in SQL)
pub struct Collection {
    /// Collection name
    pub name: String,

    /// Path to collection directory
    path: PathBuf,
}

impl Collection {
    /// Open an existing collection
    pub fn open(base_path: &Path, name: &str) -> Result<Self> {
        let path = base_path.join(name);

        if !path.exists() {
            return Err(NoSqlError::CollectionNotFound(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            path,
        })
    }

    /// Create a new collection
    pub fn create(base_path: &Path, name: &str) -> Result<Self> {
        validate_collection_name(name)?;

        let path = base_path.join(name);

        if path.exists() {
            return Err(NoSqlError::CollectionAlreadyExists(name.to_string()));
        }

        fs::create_dir_all(&path)?;
        info!(collection = name, "created collection");

        Ok(Self {
            name: name.to_string(),
            path,
        })
    }

    /// Open a collection, creating it on first use
    pub fn open_or_create(base_path: &Path, name: &str) -> Result<Self> {
        validate_collection_name(name)?;
        if base_path.join(name).exists() {
            Self::open(base_path, name)
        } else {
            Self::create(base_path, name)
        }
    }

    /// Insert a document
    pub fn insert(&self, doc: Document) -> Result<String> {
        let doc_path = self.doc_path(&doc.id);

        if doc.id.is_empty() || doc.id.starts_with('_') || doc.id.contains(['/', '\\', '.']) {
            return Err(NoSqlError::invalid(format!("invalid document id '{}'", doc.id)));
        }

        if doc_path.exists() {
            return Err(NoSqlError::DuplicateId(doc.id));
        }

        let content = serde_json::to_string_pretty(&doc)?;
        fs::write(doc_path, content)?;

        Ok(doc.id)
    }

    /// Insert several documents, returning their IDs in order
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<String>> {
        docs.into_iter().map(|doc| self.insert(doc)).collect()
    }

    /// Get a document by ID
    pub fn get(&self, id: &str) -> Result<Document> {
        let doc_path = self.doc_path(id);

        if !doc_path.exists() {
            return Err(NoSqlError::DocumentNotFound(id.to_string()));
        }

        let content = fs::read_to_string(doc_path)?;
        let doc: Document = serde_json::from_str(&content)?;

        Ok(doc)
    }

    /// Replace the stored copy of a document
    fn write(&self, doc: &Document) -> Result<()> {
        let content = serde_json::to_string_pretty(doc)?;
        fs::write(self.doc_path(&doc.id), content)?;
        Ok(())
    }

    /// List all document IDs in natural (insertion) order
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    let name = stem.to_string_lossy();
                    // Skip system files
                    if !name.starts_with('_') {
                        ids.push(name.to_string());
                    }
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Get all documents
    pub fn all(&self) -> Result<Vec<Document>> {
        let ids = self.list_ids()?;
        let mut docs = Vec::with_capacity(ids.len());

        for id in ids {
            docs.push(self.get(&id)?);
        }

        Ok(docs)
    }

    /// Run a find query
    pub fn find(&self, query: &FindQuery) -> Result<Vec<Document>> {
        let text_index = self.text_index()?;
        let docs = query.execute(&self.name, self.all()?, text_index.as_ref())?;
        debug!(collection = %self.name, returned = docs.len(), "find");
        Ok(docs)
    }

    /// Count documents matching a filter
    pub fn count(&self, filter: &Filter) -> Result<u64> {
        let matched = self.find(&FindQuery::new(filter.clone()))?;
        Ok(matched.len() as u64)
    }

    /// Update the first matching document in natural order
    pub fn update_one(&self, filter: &Filter, update: &Update) -> Result<UpdateResult> {
        self.update_matching(filter, update, Some(1))
    }

    /// Update every matching document
    pub fn update_many(&self, filter: &Filter, update: &Update) -> Result<UpdateResult> {
        self.update_matching(filter, update, None)
    }

    fn update_matching(
        &self,
        filter: &Filter,
        update: &Update,
        limit: Option<usize>,
    ) -> Result<UpdateResult> {
        update.validate()?;

        let mut query = FindQuery::new(filter.clone());
        query.limit = limit;

        let mut result = UpdateResult::default();
        for mut doc in self.find(&query)? {
            result.matched_count += 1;
            if update.apply(&mut doc)? {
                self.write(&doc)?;
                result.modified_count += 1;
            }
        }

        info!(
            collection = %self.name,
            matched = result.matched_count,
            modified = result.modified_count,
            "update"
        );
        Ok(result)
    }

    /// Run an aggregation pipeline
    pub fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>> {
        let text_index = if pipeline.starts_with_text() {
            self.text_index()?
        } else {
            None
        };
        let rows = pipeline.execute(&self.name, self.all()?, text_index.as_ref())?;
        debug!(collection = %self.name, stages = pipeline.stages.len(), returned = rows.len(), "aggregate");
        Ok(rows)
    }

    /// Create the collection's text index.
    ///
    /// An equivalent existing index is left alone; any other existing text
    /// index is a conflict.
    pub fn create_text_index(&self, spec: &TextIndexSpec) -> Result<IndexAck> {
        spec.validate()?;

        let mut catalog = self.load_indexes()?;
        if let Some(existing) = &catalog.text {
            if spec.is_equivalent(&existing.spec) {
                debug!(collection = %self.name, index = %existing.name, "text index already exists");
                return Ok(IndexAck {
                    name: existing.name.clone(),
                    created: false,
                });
            }
            return Err(NoSqlError::IndexConflict {
                collection: self.name.clone(),
                existing: existing.name.clone(),
                requested: spec.effective_name(),
            });
        }

        let index = TextIndex::from_spec(spec);
        let name = index.name.clone();
        catalog.text = Some(index);
        self.save_indexes(&catalog)?;

        info!(collection = %self.name, index = %name, "created text index");
        Ok(IndexAck {
            name,
            created: true,
        })
    }

    /// The collection's text index, if one was created
    pub fn text_index(&self) -> Result<Option<TextIndex>> {
        Ok(self.load_indexes()?.text)
    }

    /// Remove the text index. Returns `false` when there was none.
    pub fn drop_text_index(&self) -> Result<bool> {
        let mut catalog = self.load_indexes()?;
        let dropped = catalog.text.take().is_some();
        if dropped {
            self.save_indexes(&catalog)?;
            info!(collection = %self.name, "dropped text index");
        }
        Ok(dropped)
    }

    fn load_indexes(&self) -> Result<IndexCatalog> {
        let path = self.path.join(INDEX_FILE);
        if !path.exists() {
            return Ok(IndexCatalog::default());
        }
        let content = fs::read_to_string(path)?;
        let catalog: IndexCatalog = serde_json::from_str(&content)?;
        check_layout("index layout", catalog.layout, INDEX_LAYOUT)?;
        Ok(catalog)
    }

    fn save_indexes(&self, catalog: &IndexCatalog) -> Result<()> {
        let content = serde_json::to_string_pretty(catalog)?;
        fs::write(self.path.join(INDEX_FILE), content)?;
        Ok(())
    }

    fn doc_path(&self, id: &str) -> PathBuf {
        self.path.join(format!("{}.json", id))
    }

    /// Drop this collection
    pub fn drop(self) -> Result<()> {
        fs::remove_dir_all(&self.path)?;
        info!(collection = %self.name, "dropped collection");
        Ok(())
    }
}

/// Validate collection name
pub(crate) fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NoSqlError::InvalidCollectionName("name cannot be empty".to_string()));
    }

    if name.starts_with('_') {
        return Err(NoSqlError::InvalidCollectionName("name cannot start with underscore".to_string()));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(NoSqlError::InvalidCollectionName("name must be alphanumeric".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_collection_crud() {
        let dir = tempdir().unwrap();
        let col = Collection::create(dir.path(), "books").unwrap();

        let id = col.insert(Document::new(json!({"title": "Dune", "price": 9.99}))).unwrap();
        assert_eq!(col.get(&id).unwrap().get("title"), Some(&json!("Dune")));

        let result = col
            .update_one(&Filter::eq("title", "Dune"), &Update::new().set("price", 11.5))
            .unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1 });
        assert_eq!(col.get(&id).unwrap().get("price"), Some(&json!(11.5)));

        assert!(col.get("missing").is_err());
        assert!(matches!(
            col.insert(Document::with_id(id.clone(), json!({}))),
            Err(NoSqlError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_natural_order_and_update_one() {
        let dir = tempdir().unwrap();
        let col = Collection::create(dir.path(), "books").unwrap();
        let ids = col
            .insert_many(vec![
                Document::new(json!({"title": "Copy", "n": 1})),
                Document::new(json!({"title": "Copy", "n": 2})),
            ])
            .unwrap();
        assert_eq!(col.list_ids().unwrap(), ids);

        let result = col
            .update_one(&Filter::eq("title", "Copy"), &Update::new().set("n", 10))
            .unwrap();
        assert_eq!(result.matched_count, 1);
        assert_eq!(col.get(&ids[0]).unwrap().get("n"), Some(&json!(10)));
        assert_eq!(col.get(&ids[1]).unwrap().get("n"), Some(&json!(2)));

        let result = col
            .update_many(&Filter::eq("title", "Copy"), &Update::new().set("n", 10))
            .unwrap();
        assert_eq!(result, UpdateResult { matched_count: 2, modified_count: 1 });
    }

    #[test]
    fn test_text_index_lifecycle() {
        let dir = tempdir().unwrap();
        let col = Collection::create(dir.path(), "books").unwrap();
        let spec = TextIndexSpec::new().field("title").field("description");

        let ack = col.create_text_index(&spec).unwrap();
        assert!(ack.created);
        assert_eq!(ack.name, "description_text_title_text");

        let again = col.create_text_index(&spec).unwrap();
        assert!(!again.created);

        let err = col
            .create_text_index(&TextIndexSpec::new().field("author"))
            .unwrap_err();
        assert!(matches!(err, NoSqlError::IndexConflict { .. }));

        assert!(col.drop_text_index().unwrap());
        assert!(col.text_index().unwrap().is_none());
        assert!(!col.drop_text_index().unwrap());
    }

    #[test]
    fn test_index_file_layout_is_checked() {
        let dir = tempdir().unwrap();
        let col = Collection::create(dir.path(), "books").unwrap();
        col.create_text_index(&TextIndexSpec::new().field("title"))
            .unwrap();

        let path = dir.path().join("books").join(INDEX_FILE);
        let mut raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["layout"], json!(INDEX_LAYOUT));

        raw["layout"] = json!(INDEX_LAYOUT + 1);
        fs::write(&path, raw.to_string()).unwrap();
        assert!(matches!(
            col.text_index(),
            Err(NoSqlError::UnsupportedLayout { .. })
        ));

        // Pipelines without a text stage never read the index file
        let rows = col
            .aggregate(&Pipeline::new().filter(Filter::eq("title", "x")))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_invalid_names() {
        let dir = tempdir().unwrap();
        assert!(Collection::create(dir.path(), "").is_err());
        assert!(Collection::create(dir.path(), "_system").is_err());
        assert!(Collection::create(dir.path(), "my-books").is_err());
        assert!(matches!(
            Collection::open(dir.path(), "books"),
            Err(NoSqlError::CollectionNotFound(_))
        ));
    }
}
