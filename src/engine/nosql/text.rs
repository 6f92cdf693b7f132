//! Full-text index definitions, query parsing and relevance scoring

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::Document;
use super::error::{NoSqlError, Result};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "if", "in", "into",
    "is", "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

/// Index definition as requested by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextIndexSpec {
    /// Explicit index name; derived from the fields when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Field name to weight
    pub fields: BTreeMap<String, u32>,

    #[serde(default = "default_language")]
    pub default_language: String,
}

fn default_language() -> String {
    "english".to_string()
}

impl TextIndexSpec {
    pub fn new() -> Self {
        Self {
            name: None,
            fields: BTreeMap::new(),
            default_language: default_language(),
        }
    }

    /// Index a field with weight 1
    pub fn field(self, field: &str) -> Self {
        self.weighted(field, 1)
    }

    pub fn weighted(mut self, field: &str, weight: u32) -> Self {
        self.fields.insert(field.to_string(), weight);
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// The name the index is stored under
    pub fn effective_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .fields
                .keys()
                .map(|f| format!("{}_text", f))
                .collect::<Vec<_>>()
                .join("_"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(NoSqlError::invalid("text index needs at least one field"));
        }
        if let Some((field, _)) = self.fields.iter().find(|(f, w)| f.is_empty() || **w == 0) {
            return Err(NoSqlError::invalid(format!(
                "text index field '{}' must be named and weighted above zero",
                field
            )));
        }
        Ok(())
    }

    /// Same fields, weights and language; names only compared when requested explicitly
    pub fn is_equivalent(&self, existing: &TextIndexSpec) -> bool {
        let names_match = match &self.name {
            Some(_) => self.effective_name() == existing.effective_name(),
            None => true,
        };
        names_match
            && self.fields == existing.fields
            && self.default_language == existing.default_language
    }
}

impl Default for TextIndexSpec {
    fn default() -> Self {
        Self::new()
    }
}

/// A text index stored in a collection's `_indexes.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextIndex {
    pub name: String,
    pub spec: TextIndexSpec,
    pub created_at: DateTime<Utc>,
}

impl TextIndex {
    pub fn from_spec(spec: &TextIndexSpec) -> Self {
        let mut spec = spec.clone();
        let name = spec.effective_name();
        spec.name = Some(name.clone());
        Self {
            name,
            spec,
            created_at: Utc::now(),
        }
    }

    /// Relevance of `doc` for `query`; `None` when the document does not match
    pub fn score(&self, query: &TextQuery, doc: &Document) -> Option<f64> {
        let fields: Vec<(u32, String)> = self
            .spec
            .fields
            .iter()
            .filter_map(|(field, weight)| {
                let text = field_text(doc.get(field)?);
                (!text.is_empty()).then_some((*weight, text))
            })
            .collect();

        let tokenized: Vec<(u32, Vec<String>)> = fields
            .iter()
            .map(|(weight, text)| (*weight, tokenize(text)))
            .collect();

        let excluded = query
            .negated
            .iter()
            .any(|term| tokenized.iter().any(|(_, tokens)| tokens.contains(term)));
        if excluded {
            return None;
        }

        let phrases_present = query.phrases.iter().all(|phrase| {
            fields
                .iter()
                .any(|(_, text)| text.to_lowercase().contains(phrase.as_str()))
        });
        if !phrases_present {
            return None;
        }

        let mut score = 0.0;
        for (weight, tokens) in &tokenized {
            if tokens.is_empty() {
                continue;
            }
            let mut freq: HashMap<&str, usize> = HashMap::new();
            for token in tokens {
                *freq.entry(token.as_str()).or_default() += 1;
            }
            let n_tokens = tokens.len() as f64;
            let field_score: f64 = query
                .terms
                .iter()
                .filter_map(|term| freq.get(term.as_str()))
                .map(|tf| 0.5 + 0.5 * (*tf as f64 / n_tokens))
                .sum();
            score += f64::from(*weight) * field_score;
        }

        (score > 0.0).then_some(score)
    }
}

/// Free-text search request, kept as the caller wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSearch {
    pub search: String,
}

impl TextSearch {
    pub fn new(search: &str) -> Self {
        Self {
            search: search.to_string(),
        }
    }

    /// Split into terms, quoted phrases and `-negated` terms
    pub fn parse(&self) -> Result<TextQuery> {
        let mut query = TextQuery::default();
        let mut seen = HashSet::new();

        let mut rest = self.search.as_str();
        while !rest.is_empty() {
            rest = rest.trim_start();
            if let Some(after_quote) = rest.strip_prefix('"') {
                let (phrase, tail) = match after_quote.find('"') {
                    Some(end) => (&after_quote[..end], &after_quote[end + 1..]),
                    None => (after_quote, ""),
                };
                let phrase = phrase.trim().to_lowercase();
                if !phrase.is_empty() {
                    for token in tokenize(&phrase) {
                        if seen.insert(token.clone()) {
                            query.terms.push(token);
                        }
                    }
                    query.phrases.push(phrase);
                }
                rest = tail;
                continue;
            }

            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let (word, tail) = rest.split_at(end);
            rest = tail;
            match word.strip_prefix('-') {
                Some(negated) => query.negated.extend(tokenize(negated)),
                None => {
                    for token in tokenize(word) {
                        if seen.insert(token.clone()) {
                            query.terms.push(token);
                        }
                    }
                }
            }
        }

        // Phrases only filter; scoring needs at least one term
        if query.terms.is_empty() {
            return Err(NoSqlError::invalid(format!(
                "text search '{}' has no searchable terms",
                self.search
            )));
        }
        Ok(query)
    }
}

/// Parsed form of a [`TextSearch`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextQuery {
    pub terms: Vec<String>,
    pub phrases: Vec<String>,
    pub negated: Vec<String>,
}

/// Lowercase, split on non-alphanumerics, drop stop words, stem
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .collect()
}

fn stem(word: &str) -> String {
    let len = word.chars().count();
    if len > 4 {
        if let Some(base) = word.strip_suffix("ies") {
            return format!("{}y", base);
        }
    }
    if len > 5 {
        if let Some(base) = word.strip_suffix("ing") {
            return base.to_string();
        }
    }
    if len > 4 {
        if let Some(base) = word.strip_suffix("ed") {
            return base.to_string();
        }
    }
    if len > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}
