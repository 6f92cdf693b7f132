//! Typed filter expressions for NoSQL documents

use std::borrow::Cow;
use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{lookup, Document};
use super::error::{NoSqlError, Result};
use super::text::{TextQuery, TextSearch};

/// Comparison applied to a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOp {
    /// Equality
    Eq(Value),
    /// Not equal (also matches documents without the field)
    Ne(Value),
    /// Greater than
    Gt(Value),
    /// Greater than or equal
    Gte(Value),
    /// Less than
    Lt(Value),
    /// Less than or equal
    Lte(Value),
    /// In array of values
    In(Vec<Value>),
    /// Unanchored regular expression over string values
    Regex {
        pattern: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// Field exists
    Exists(bool),
}

/// Filter expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Matches every document
    #[default]
    All,
    Field {
        field: String,
        op: FieldOp,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Free-text search over the collection's text index
    Text(TextSearch),
}

impl Filter {
    pub fn all() -> Self {
        Filter::All
    }

    pub fn field(field: &str, op: FieldOp) -> Self {
        Filter::Field {
            field: field.to_string(),
            op,
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::Eq(value.into()))
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::Ne(value.into()))
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::Gt(value.into()))
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::Gte(value.into()))
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::Lt(value.into()))
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::Lte(value.into()))
    }

    pub fn is_in(field: &str, values: Vec<Value>) -> Self {
        Self::field(field, FieldOp::In(values))
    }

    pub fn exists(field: &str, should_exist: bool) -> Self {
        Self::field(field, FieldOp::Exists(should_exist))
    }

    /// Inclusive range on one field
    pub fn between(field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Filter::And(vec![Self::gte(field, low), Self::lte(field, high)])
    }

    pub fn regex(field: &str, pattern: &str, case_insensitive: bool) -> Self {
        Self::field(
            field,
            FieldOp::Regex {
                pattern: pattern.to_string(),
                case_insensitive,
            },
        )
    }

    pub fn text(search: &str) -> Self {
        Filter::Text(TextSearch::new(search))
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Validate and prepare the filter for evaluation.
    ///
    /// A text search may only appear at the top level or directly under a
    /// top-level `And`, at most once.
    pub fn compile(&self) -> Result<CompiledFilter> {
        match self {
            Filter::Text(search) => Ok(CompiledFilter {
                predicate: Predicate::All,
                text: Some(search.parse()?),
            }),
            Filter::And(children) => {
                let mut text = None;
                let mut predicates = Vec::with_capacity(children.len());
                for child in children {
                    if let Filter::Text(search) = child {
                        if text.is_some() {
                            return Err(NoSqlError::invalid(
                                "only one text search is allowed per filter",
                            ));
                        }
                        text = Some(search.parse()?);
                    } else {
                        predicates.push(Predicate::compile(child)?);
                    }
                }
                Ok(CompiledFilter {
                    predicate: Predicate::And(predicates),
                    text,
                })
            }
            other => Ok(CompiledFilter {
                predicate: Predicate::compile(other)?,
                text: None,
            }),
        }
    }

    /// Whether the expression contains a text search anywhere
    pub fn has_text(&self) -> bool {
        match self {
            Filter::Text(_) => true,
            Filter::And(children) | Filter::Or(children) => children.iter().any(Filter::has_text),
            Filter::Not(inner) => inner.has_text(),
            Filter::All | Filter::Field { .. } => false,
        }
    }
}

/// Rows a filter can be evaluated against
pub trait FieldSource {
    fn field_value(&self, path: &str) -> Option<Cow<'_, Value>>;
}

impl FieldSource for Document {
    fn field_value(&self, path: &str) -> Option<Cow<'_, Value>> {
        if path == "_id" {
            return Some(Cow::Owned(Value::String(self.id.clone())));
        }
        self.get(path).map(Cow::Borrowed)
    }
}

impl FieldSource for Value {
    fn field_value(&self, path: &str) -> Option<Cow<'_, Value>> {
        lookup(self, path).map(Cow::Borrowed)
    }
}

/// A validated filter, regexes compiled and the text search split out
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    predicate: Predicate,
    text: Option<TextQuery>,
}

impl CompiledFilter {
    /// Evaluate the non-text part of the filter
    pub fn matches<T: FieldSource>(&self, row: &T) -> bool {
        self.predicate.matches(row)
    }

    pub fn text(&self) -> Option<&TextQuery> {
        self.text.as_ref()
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    All,
    Field { field: String, op: CompiledOp },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

#[derive(Debug, Clone)]
enum CompiledOp {
    Plain(FieldOp),
    Regex(Regex),
}

impl Predicate {
    fn compile(filter: &Filter) -> Result<Self> {
        Ok(match filter {
            Filter::All => Predicate::All,
            Filter::Field { field, op } => {
                if field.is_empty() {
                    return Err(NoSqlError::invalid("filter field name cannot be empty"));
                }
                let op = match op {
                    FieldOp::Regex {
                        pattern,
                        case_insensitive,
                    } => CompiledOp::Regex(
                        RegexBuilder::new(pattern)
                            .case_insensitive(*case_insensitive)
                            .build()?,
                    ),
                    other => CompiledOp::Plain(other.clone()),
                };
                Predicate::Field {
                    field: field.clone(),
                    op,
                }
            }
            Filter::And(children) => {
                Predicate::And(children.iter().map(Predicate::compile).collect::<Result<_>>()?)
            }
            Filter::Or(children) => {
                Predicate::Or(children.iter().map(Predicate::compile).collect::<Result<_>>()?)
            }
            Filter::Not(inner) => Predicate::Not(Box::new(Predicate::compile(inner)?)),
            Filter::Text(_) => {
                return Err(NoSqlError::invalid(
                    "text search must be at the top level of a filter",
                ))
            }
        })
    }

    fn matches<T: FieldSource>(&self, row: &T) -> bool {
        match self {
            Predicate::All => true,
            Predicate::And(children) => children.iter().all(|p| p.matches(row)),
            Predicate::Or(children) => children.iter().any(|p| p.matches(row)),
            Predicate::Not(inner) => !inner.matches(row),
            Predicate::Field { field, op } => op.matches(row.field_value(field).as_deref()),
        }
    }
}

impl CompiledOp {
    fn matches(&self, value: Option<&Value>) -> bool {
        let op = match self {
            CompiledOp::Regex(re) => {
                return matches!(value, Some(Value::String(s)) if re.is_match(s));
            }
            CompiledOp::Plain(op) => op,
        };

        match (op, value) {
            (FieldOp::Exists(should_exist), val) => val.is_some() == *should_exist,
            (FieldOp::Eq(Value::Null), None) => true,
            (FieldOp::Ne(Value::Null), None) => false,
            (FieldOp::Ne(_), None) => true,
            (_, None) => false,
            (FieldOp::Eq(expected), Some(actual)) => value_matches(actual, expected),
            (FieldOp::Ne(expected), Some(actual)) => !value_matches(actual, expected),
            (FieldOp::Gt(expected), Some(actual)) => {
                compare_values(actual, expected) == Some(Ordering::Greater)
            }
            (FieldOp::Gte(expected), Some(actual)) => {
                matches!(compare_values(actual, expected), Some(Ordering::Greater | Ordering::Equal))
            }
            (FieldOp::Lt(expected), Some(actual)) => {
                compare_values(actual, expected) == Some(Ordering::Less)
            }
            (FieldOp::Lte(expected), Some(actual)) => {
                matches!(compare_values(actual, expected), Some(Ordering::Less | Ordering::Equal))
            }
            (FieldOp::In(values), Some(actual)) => {
                values.iter().any(|expected| value_matches(actual, expected))
            }
            (FieldOp::Regex { .. }, Some(_)) => false,
        }
    }
}

/// Equality with numeric normalization; arrays match when any element does
fn value_matches(actual: &Value, expected: &Value) -> bool {
    if values_equal(actual, expected) {
        return true;
    }
    match actual {
        Value::Array(items) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        _ => false,
    }
}

/// JSON equality where `15` and `15.0` are the same number
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Compare two JSON values of the same kind
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orwell() -> Document {
        Document::new(json!({
            "title": "Animal Farm",
            "author": "George Orwell",
            "price": 10,
            "published_year": 1945,
            "in_stock": true,
            "tags": ["satire", "classic"]
        }))
    }

    fn check(filter: Filter, doc: &Document) -> bool {
        filter.compile().unwrap().matches(doc)
    }

    #[test]
    fn test_filter_eq() {
        let doc = orwell();
        assert!(check(Filter::eq("author", "George Orwell"), &doc));
        assert!(!check(Filter::eq("author", "george orwell"), &doc));
        assert!(check(Filter::eq("price", 10.0), &doc));
        assert!(check(Filter::eq("in_stock", true), &doc));
        assert!(check(Filter::eq("tags", "satire"), &doc));
        assert!(check(Filter::eq("_id", doc.id.clone()), &doc));
    }

    #[test]
    fn test_missing_fields() {
        let doc = orwell();
        assert!(!check(Filter::gte("pages", 0), &doc));
        assert!(check(Filter::ne("pages", 100), &doc));
        assert!(check(Filter::eq("pages", Value::Null), &doc));
        assert!(check(Filter::exists("pages", false), &doc));
    }

    #[test]
    fn test_range_and_logic() {
        let doc = orwell();
        assert!(check(Filter::between("published_year", 1939, 1970), &doc));
        assert!(check(Filter::between("published_year", 1945, 1945), &doc));
        assert!(!check(Filter::between("published_year", 1946, 1970), &doc));
        assert!(check(
            Filter::or(vec![Filter::eq("price", 99), Filter::lt("price", 11)]),
            &doc
        ));
        assert!(!check(Filter::not(Filter::eq("in_stock", true)), &doc));
        // strings and numbers do not compare
        assert!(!check(Filter::gt("published_year", "1900"), &doc));
    }

    #[test]
    fn test_regex_case_insensitive() {
        let doc = orwell();
        assert!(check(Filter::regex("title", "FARM", true), &doc));
        assert!(!check(Filter::regex("title", "FARM", false), &doc));
        assert!(check(Filter::regex("title", "^Animal", false), &doc));
        assert!(!check(Filter::regex("price", "1", true), &doc));
    }

    #[test]
    fn test_invalid_regex() {
        let err = Filter::regex("title", "(unclosed", true).compile().unwrap_err();
        assert!(matches!(err, NoSqlError::InvalidRegex(_)));
    }

    #[test]
    fn test_text_placement() {
        let top = Filter::text("farm").compile().unwrap();
        assert!(top.text().is_some());

        let nested = Filter::and(vec![Filter::text("farm"), Filter::eq("in_stock", true)])
            .compile()
            .unwrap();
        assert_eq!(nested.text().unwrap().terms, vec!["farm"]);

        assert!(Filter::or(vec![Filter::text("farm")]).compile().is_err());
        assert!(Filter::and(vec![Filter::text("a farm"), Filter::text("b farm")])
            .compile()
            .is_err());
        assert!(Filter::not(Filter::text("farm")).has_text());
    }
}
