//! Book records and aggregation rows

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{CatalogError, Result};
use crate::engine::nosql::{Document, NoSqlError};

/// A book as stored in the `books` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub price: f64,
    pub pages: u32,
    pub published_year: i32,
    pub in_stock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Book {
    pub fn validate(&self) -> Result<()> {
        validate_price(self.price)
    }

    /// Validated document form, ready to insert
    pub fn to_document(&self) -> Result<Document> {
        self.validate()?;
        let data = serde_json::to_value(self).map_err(NoSqlError::from)?;
        Ok(Document::new(data))
    }
}

pub(crate) fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(CatalogError::InvalidInput(format!(
            "price must be a non-negative number, got {}",
            price
        )));
    }
    Ok(())
}

/// A stored book with its identity and, for text searches, its relevance
#[derive(Debug, Clone, PartialEq)]
pub struct BookRecord {
    pub id: String,
    pub book: Book,
    pub score: Option<f64>,
}

impl BookRecord {
    pub(crate) fn from_document(doc: Document, score_field: Option<&str>) -> Result<Self> {
        let score = score_field
            .and_then(|field| doc.get(field))
            .and_then(Value::as_f64);
        let book = serde_json::from_value(doc.data).map_err(|source| CatalogError::Decode {
            id: doc.id.clone(),
            source,
        })?;
        Ok(Self {
            id: doc.id,
            book,
            score,
        })
    }
}

/// Average price, count and page total for one genre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreSummary {
    #[serde(rename = "_id")]
    pub genre: Option<String>,
    #[serde(rename = "averagePrice")]
    pub average_price: Option<f64>,
    #[serde(rename = "bookCount")]
    pub book_count: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}

/// An author with more than one book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSummary {
    #[serde(rename = "_id")]
    pub author: Option<String>,
    #[serde(rename = "bookCount")]
    pub book_count: u64,
    /// Titles in natural order
    pub books: Vec<String>,
    #[serde(rename = "avgPrice")]
    pub avg_price: Option<f64>,
}

pub(crate) fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            let id = row.get("_id").map(Value::to_string).unwrap_or_default();
            serde_json::from_value(row).map_err(|source| CatalogError::Decode { id, source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dune() -> Book {
        Book {
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            genre: "Science Fiction".into(),
            price: 9.99,
            pages: 412,
            published_year: 1965,
            in_stock: true,
            description: None,
        }
    }

    #[test]
    fn test_book_document() {
        let doc = dune().to_document().unwrap();
        assert_eq!(doc.get("pages"), Some(&json!(412)));
        assert!(doc.get("description").is_none());

        let record = BookRecord::from_document(doc, None).unwrap();
        assert_eq!(record.book, dune());
        assert_eq!(record.score, None);
    }

    #[test]
    fn test_negative_price_rejected() {
        let mut book = dune();
        book.price = -1.0;
        assert!(matches!(book.to_document(), Err(CatalogError::InvalidInput(_))));
        book.price = f64::NAN;
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_decode_failure_names_document() {
        let doc = Document::with_id("broken".into(), json!({"title": "No author"}));
        match BookRecord::from_document(doc, None) {
            Err(CatalogError::Decode { id, .. }) => assert_eq!(id, "broken"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rows() {
        let rows = vec![json!({
            "_id": "Dystopian",
            "averagePrice": 12.5,
            "bookCount": 2,
            "totalPages": 440
        })];
        let summaries: Vec<GenreSummary> = decode_rows(rows).unwrap();
        assert_eq!(summaries[0].genre.as_deref(), Some("Dystopian"));
        assert_eq!(summaries[0].total_pages, 440);
    }
}
