//! Catalog Error Types

use thiserror::Error;

use crate::engine::nosql::{ErrorKind, NoSqlError};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] NoSqlError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Document {id} is not a valid book: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::Store(err) => err.kind(),
            CatalogError::InvalidInput(_) => ErrorKind::InvalidInput,
            CatalogError::Decode { .. } => ErrorKind::Storage,
        }
    }

    /// Missing or conflicting index definitions
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
