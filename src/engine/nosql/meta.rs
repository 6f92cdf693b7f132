//! Store manifest kept in `nosql/_meta.json`
//!
//! Records which on-disk layouts a store was written with. Opening a store
//! whose collection or index layout this build cannot read fails up front
//! instead of misreading documents later.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{NoSqlError, Result};

pub const ENGINE: &str = "bookshelf-nosql";

const MANIFEST_FILE: &str = "_meta.json";

/// One directory per collection, one `<id>.json` file per document
pub const COLLECTION_LAYOUT: u32 = 1;

/// Shape of each collection's `_indexes.json`
pub const INDEX_LAYOUT: u32 = 1;

/// How document ids are minted. Natural order is id order, so the scheme
/// must sort by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdScheme {
    UuidV7,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub engine: String,
    pub collection_layout: u32,
    pub index_layout: u32,
    pub id_scheme: IdScheme,
    /// Crate version that created the store
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Meta {
    pub fn new() -> Self {
        Self {
            engine: ENGINE.to_string(),
            collection_layout: COLLECTION_LAYOUT,
            index_layout: INDEX_LAYOUT,
            id_scheme: IdScheme::UuidV7,
            created_by: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
        }
    }

    /// Read and check the manifest of an existing store
    pub fn load(store_dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(store_dir.join(MANIFEST_FILE))?;
        let meta: Meta = serde_json::from_str(&content)?;
        meta.check()?;
        Ok(meta)
    }

    pub fn save(&self, store_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(store_dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.engine != ENGINE {
            return Err(NoSqlError::ForeignStore(self.engine.clone()));
        }
        check_layout("collection layout", self.collection_layout, COLLECTION_LAYOUT)?;
        check_layout("index layout", self.index_layout, INDEX_LAYOUT)
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn check_layout(part: &'static str, found: u32, supported: u32) -> Result<()> {
    if found != supported {
        return Err(NoSqlError::UnsupportedLayout {
            part,
            found,
            supported,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_manifest_roundtrip() {
        let dir = tempdir().unwrap();
        let meta = Meta::new();
        meta.save(dir.path()).unwrap();

        let loaded = Meta::load(dir.path()).unwrap();
        assert_eq!(loaded, meta);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["id_scheme"], json!("uuid-v7"));
    }

    #[test]
    fn test_rejects_newer_index_layout() {
        let dir = tempdir().unwrap();
        let mut meta = Meta::new();
        meta.index_layout = INDEX_LAYOUT + 1;
        meta.save(dir.path()).unwrap();

        match Meta::load(dir.path()) {
            Err(NoSqlError::UnsupportedLayout { part, found, .. }) => {
                assert_eq!(part, "index layout");
                assert_eq!(found, INDEX_LAYOUT + 1);
            }
            other => panic!("expected layout error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_foreign_store() {
        let dir = tempdir().unwrap();
        let mut meta = Meta::new();
        meta.engine = "docstore".to_string();
        meta.save(dir.path()).unwrap();

        assert!(matches!(
            Meta::load(dir.path()),
            Err(NoSqlError::ForeignStore(ref engine)) if engine == "docstore"
        ));
    }
}
