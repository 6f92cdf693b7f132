//! NoSQL Error Types

use std::io;
use thiserror::Error;

/// Broad classification of store failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or conflicting index definitions
    Configuration,
    /// Malformed filters, ranges, patterns or values
    InvalidInput,
    /// A named collection or document does not exist
    NotFound,
    /// Disk or encoding failures
    Storage,
}

#[derive(Error, Debug)]
pub enum NoSqlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Store was written by '{0}', not this engine")]
    ForeignStore(String),

    #[error("Unsupported {part} version {found} (this build reads {supported})")]
    UnsupportedLayout {
        part: &'static str,
        found: u32,
        supported: u32,
    },

    #[error("Document ID already exists: {0}")]
    DuplicateId(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Text search on '{0}' requires a text index")]
    MissingTextIndex(String),

    #[error("Index conflict on '{collection}': existing text index '{existing}' differs from '{requested}'")]
    IndexConflict {
        collection: String,
        existing: String,
        requested: String,
    },
}

impl NoSqlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NoSqlError::MissingTextIndex(_) | NoSqlError::IndexConflict { .. } => {
                ErrorKind::Configuration
            }
            NoSqlError::InvalidInput(_)
            | NoSqlError::InvalidRegex(_)
            | NoSqlError::InvalidCollectionName(_)
            | NoSqlError::DuplicateId(_)
            | NoSqlError::CollectionAlreadyExists(_) => ErrorKind::InvalidInput,
            NoSqlError::CollectionNotFound(_) | NoSqlError::DocumentNotFound(_) => {
                ErrorKind::NotFound
            }
            NoSqlError::Io(_)
            | NoSqlError::Json(_)
            | NoSqlError::ForeignStore(_)
            | NoSqlError::UnsupportedLayout { .. } => ErrorKind::Storage,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        NoSqlError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, NoSqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            NoSqlError::MissingTextIndex("books".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(NoSqlError::invalid("bad range").kind(), ErrorKind::InvalidInput);
        assert_eq!(
            NoSqlError::DocumentNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
    }
}
