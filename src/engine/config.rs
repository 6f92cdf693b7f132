//! Bookshelf Configuration Module
//! Handles loading and validating bookshelf.config.json

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::nosql::TextIndexSpec;

pub const CONFIG_FILE: &str = "bookshelf.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub project: ProjectConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub text_index: TextIndexConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store directory, relative to the project directory
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextIndexConfig {
    /// Searchable field to weight
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, u32>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_collection() -> String {
    "books".to_string()
}

fn default_weights() -> BTreeMap<String, u32> {
    ["title", "author", "description"]
        .into_iter()
        .map(|field| (field.to_string(), 1))
        .collect()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
        }
    }
}

impl Default for TextIndexConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
        }
    }
}

impl TextIndexConfig {
    pub fn spec(&self) -> TextIndexSpec {
        self.weights
            .iter()
            .fold(TextIndexSpec::new(), |spec, (field, weight)| {
                spec.weighted(field, *weight)
            })
    }
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_project(name: &str) -> Self {
        Self {
            version: "0.1.0".to_string(),
            project: ProjectConfig {
                name: name.to_string(),
            },
            store: StoreConfig::default(),
            text_index: TextIndexConfig::default(),
        }
    }

    /// Absolute location of the store for a project directory
    pub fn store_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.store.path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let collection = &self.store.collection;
        if collection.is_empty()
            || collection.starts_with('_')
            || !collection.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Invalid(format!(
                "store.collection '{}' must be alphanumeric and not start with '_'",
                collection
            )));
        }
        if self.text_index.weights.is_empty() {
            return Err(ConfigError::Invalid(
                "text_index.weights needs at least one field".to_string(),
            ));
        }
        if let Some(field) = self.text_index.weights.iter().find(|(_, w)| **w == 0).map(|(f, _)| f) {
            return Err(ConfigError::Invalid(format!(
                "text_index.weights.{} must be above zero",
                field
            )));
        }
        Ok(())
    }
}
