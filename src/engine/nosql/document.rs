//! Document representation for NoSQL storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A NoSQL document with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID (UUID v7, so ids sort in insertion order)
    #[serde(rename = "_id")]
    pub id: String,

    /// Creation timestamp
    #[serde(rename = "_created_at")]
    pub created_at: DateTime<Utc>,

    /// Last modified timestamp
    #[serde(rename = "_modified_at")]
    pub modified_at: DateTime<Utc>,

    /// The actual document data
    #[serde(flatten)]
    pub data: Value,
}

impl Document {
    /// Create a new document with a generated, time-ordered ID
    pub fn new(data: Value) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), data)
    }

    /// Create a document with a specific ID
    pub fn with_id(id: String, data: Value) -> Self {
        let now = Utc::now();
        let data = match data {
            Value::Object(_) => data,
            _ => Value::Object(Map::new()),
        };
        Self {
            id,
            created_at: now,
            modified_at: now,
            data,
        }
    }

    /// Get a field from the document data; dotted paths reach into objects
    pub fn get(&self, field: &str) -> Option<&Value> {
        lookup(&self.data, field)
    }

    /// Set a field, creating intermediate objects for dotted paths.
    ///
    /// Returns `true` when the stored value changed.
    pub fn set(&mut self, field: &str, value: Value) -> bool {
        let Value::Object(map) = &mut self.data else {
            return false;
        };

        let mut parts = field.split('.').peekable();
        let mut current = map;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                if current.get(part) == Some(&value) {
                    return false;
                }
                current.insert(part.to_string(), value);
                self.modified_at = Utc::now();
                return true;
            }
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                return false;
            };
            current = next;
        }
        false
    }

    /// Remove a field. Returns `true` when something was removed.
    pub fn unset(&mut self, field: &str) -> bool {
        let (parent, leaf) = match field.rsplit_once('.') {
            Some((parent, leaf)) => (lookup_mut(&mut self.data, parent), leaf),
            None => (Some(&mut self.data), field),
        };
        let removed = parent
            .and_then(Value::as_object_mut)
            .and_then(|map| map.remove(leaf))
            .is_some();
        if removed {
            self.modified_at = Utc::now();
        }
        removed
    }

    /// Flat JSON view with `_id` merged into the data
    pub fn to_json(&self) -> Value {
        let mut map = match &self.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        map.insert("_id".to_string(), Value::String(self.id.clone()));
        Value::Object(map)
    }
}

/// Resolve a dotted path inside a JSON value
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(map) => map.get(part),
        _ => None,
    })
}

fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(map) => map.get_mut(part),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_creation() {
        let doc = Document::new(json!({"title": "1984", "pages": 328}));
        assert_eq!(doc.id.len(), 36);
        assert_eq!(doc.get("title"), Some(&json!("1984")));
    }

    #[test]
    fn test_id_uniqueness() {
        let a = Document::new(json!({}));
        let b = Document::new(json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_set_reports_changes() {
        let mut doc = Document::new(json!({"price": 17.99}));
        assert!(!doc.set("price", json!(17.99)));
        assert!(doc.set("price", json!(12.5)));
        assert!(doc.set("meta.shelf", json!("B2")));
        assert_eq!(doc.get("meta.shelf"), Some(&json!("B2")));
    }

    #[test]
    fn test_unset() {
        let mut doc = Document::new(json!({"a": {"b": 1, "c": 2}}));
        assert!(doc.unset("a.b"));
        assert!(!doc.unset("a.b"));
        assert_eq!(doc.get("a"), Some(&json!({"c": 2})));
    }

    #[test]
    fn test_serde_layout() {
        let doc = Document::with_id("abc".into(), json!({"title": "Dune"}));
        let raw = serde_json::to_value(&doc).unwrap();
        assert_eq!(raw["_id"], json!("abc"));
        assert_eq!(raw["title"], json!("Dune"));

        let back: Document = serde_json::from_value(raw).unwrap();
        assert_eq!(back.id, "abc");
        assert_eq!(back.get("title"), Some(&json!("Dune")));
        assert!(back.get("_id").is_none());
        assert_eq!(doc.to_json()["_id"], json!("abc"));
    }
}
