//! Find queries: filter, sort, skip/limit and relevance projection

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{lookup, Document};
use super::error::{NoSqlError, Result};
use super::filter::{compare_values, Filter};
use super::text::TextIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One sort criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Field { field: String, order: SortOrder },
    /// Relevance from the text search, highest first
    TextScore,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        SortKey::Field {
            field: field.to_string(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        SortKey::Field {
            field: field.to_string(),
            order: SortOrder::Desc,
        }
    }
}

/// Anything a list of [`SortKey`]s can order
pub trait Sortable {
    fn sort_value(&self, field: &str) -> Option<&Value>;
    fn text_score(&self) -> Option<f64>;
}

impl Sortable for Value {
    fn sort_value(&self, field: &str) -> Option<&Value> {
        lookup(self, field)
    }

    fn text_score(&self) -> Option<f64> {
        None
    }
}

/// Stable multi-key sort. Missing values order first ascending.
pub fn sort_by_keys<T: Sortable>(rows: &mut [T], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|key| match key {
                SortKey::Field { field, order } => {
                    let ordering = total_order(a.sort_value(field), b.sort_value(field));
                    match order {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => ordering.reverse(),
                    }
                }
                SortKey::TextScore => {
                    let a = a.text_score().unwrap_or(0.0);
                    let b = b.text_score().unwrap_or(0.0);
                    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order across JSON values: null, numbers, strings, objects, arrays, booleans
pub fn compare_any(a: &Value, b: &Value) -> Ordering {
    total_order(Some(a), Some(b))
}

fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b)
            .unwrap_or_else(|| type_rank(Some(a)).cmp(&type_rank(Some(b)))),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// A matched document and its relevance, when a text search ran
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: Option<f64>,
}

impl Sortable for ScoredDocument {
    fn sort_value(&self, field: &str) -> Option<&Value> {
        self.document.get(field)
    }

    fn text_score(&self) -> Option<f64> {
        self.score
    }
}

/// Find query with filter and result options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FindQuery {
    #[serde(default)]
    pub filter: Filter,

    /// Applied in order; later keys break ties
    #[serde(default)]
    pub sort: Vec<SortKey>,

    /// Skip results (for pagination)
    #[serde(default)]
    pub skip: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Write the relevance score into each result under this field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_field: Option<String>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn with_score(mut self, field: &str) -> Self {
        self.score_field = Some(field.to_string());
        self
    }

    /// Run against an in-memory set of documents.
    ///
    /// `text_index` must be present when the filter searches text.
    pub fn execute(
        &self,
        collection: &str,
        docs: Vec<Document>,
        text_index: Option<&TextIndex>,
    ) -> Result<Vec<Document>> {
        let compiled = self.filter.compile()?;
        let text = match (compiled.text(), text_index) {
            (Some(query), Some(index)) => Some((query, index)),
            (Some(_), None) => return Err(NoSqlError::MissingTextIndex(collection.to_string())),
            (None, _) => None,
        };

        let wants_score =
            self.score_field.is_some() || self.sort.iter().any(|k| *k == SortKey::TextScore);
        if wants_score && text.is_none() {
            return Err(NoSqlError::invalid(
                "relevance score requested without a text search",
            ));
        }

        let mut results: Vec<ScoredDocument> = docs
            .into_iter()
            .filter(|doc| compiled.matches(doc))
            .filter_map(|document| match text {
                Some((query, index)) => {
                    let score = index.score(query, &document)?;
                    Some(ScoredDocument {
                        document,
                        score: Some(score),
                    })
                }
                None => Some(ScoredDocument {
                    document,
                    score: None,
                }),
            })
            .collect();

        sort_by_keys(&mut results, &self.sort);

        let results = results.into_iter().skip(self.skip);
        let results: Vec<ScoredDocument> = match self.limit {
            Some(n) => results.take(n).collect(),
            None => results.collect(),
        };

        Ok(results
            .into_iter()
            .map(|scored| {
                let mut document = scored.document;
                if let (Some(field), Some(score)) = (&self.score_field, scored.score) {
                    if let Some(map) = document.data.as_object_mut() {
                        map.insert(field.clone(), Value::from(score));
                    }
                }
                document
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::nosql::text::TextIndexSpec;
    use serde_json::json;

    fn books() -> Vec<Document> {
        vec![
            Document::new(json!({"title": "Brave New World", "published_year": 1932, "description": "dystopian fiction set in the future"})),
            Document::new(json!({"title": "1984", "published_year": 1949, "description": "dystopian dystopian"})),
            Document::new(json!({"title": "Animal Farm", "published_year": 1945})),
            Document::new(json!({"title": "Untitled draft"})),
        ]
    }

    fn titles(docs: &[Document]) -> Vec<&str> {
        docs.iter()
            .map(|d| d.get("title").and_then(Value::as_str).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_query_execution() {
        let results = FindQuery::new(Filter::between("published_year", 1939, 1970))
            .sort(SortKey::asc("published_year"))
            .execute("books", books(), None)
            .unwrap();
        assert_eq!(titles(&results), vec!["Animal Farm", "1984"]);
    }

    #[test]
    fn test_missing_values_sort_first() {
        let results = FindQuery::default()
            .sort(SortKey::asc("published_year"))
            .execute("books", books(), None)
            .unwrap();
        assert_eq!(results[0].get("title"), Some(&json!("Untitled draft")));

        let results = FindQuery::default()
            .sort(SortKey::desc("published_year"))
            .skip(1)
            .limit(2)
            .execute("books", books(), None)
            .unwrap();
        assert_eq!(titles(&results), vec!["Animal Farm", "Brave New World"]);
    }

    #[test]
    fn test_text_requires_index() {
        let err = FindQuery::new(Filter::text("dystopian"))
            .execute("books", books(), None)
            .unwrap_err();
        assert!(matches!(err, NoSqlError::MissingTextIndex(ref c) if c == "books"));
    }

    #[test]
    fn test_score_projection_and_sort() {
        let index = TextIndex::from_spec(&TextIndexSpec::new().field("title").field("description"));
        let results = FindQuery::new(Filter::text("dystopian"))
            .with_score("score")
            .sort(SortKey::TextScore)
            .execute("books", books(), Some(&index))
            .unwrap();
        assert_eq!(titles(&results), vec!["1984", "Brave New World"]);
        assert!(results[0].get("score").is_some());
    }

    #[test]
    fn test_score_without_text_is_rejected() {
        let err = FindQuery::default()
            .sort(SortKey::TextScore)
            .execute("books", books(), None)
            .unwrap_err();
        assert!(matches!(err, NoSqlError::InvalidInput(_)));
    }
}
