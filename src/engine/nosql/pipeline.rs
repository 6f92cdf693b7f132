//! Aggregation pipelines: match, group, sort, project, skip and limit stages

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::document::{lookup, Document};
use super::error::{NoSqlError, Result};
use super::filter::Filter;
use super::query::{compare_any, sort_by_keys, SortKey};
use super::text::TextIndex;

/// Input to a numeric accumulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Field(String),
    Literal(f64),
}

/// Per-group accumulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulator {
    Sum(Operand),
    Avg(String),
    Min(String),
    Max(String),
    /// Collect values in encounter order; missing values are skipped
    Push(String),
    First(String),
}

/// Group rows by one field (or everything when `key` is `None`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub fields: Vec<(String, Accumulator)>,
}

impl GroupStage {
    pub fn by(field: &str) -> Self {
        Self {
            key: Some(field.to_string()),
            fields: Vec::new(),
        }
    }

    /// A single group over every input row
    pub fn all() -> Self {
        Self {
            key: None,
            fields: Vec::new(),
        }
    }

    pub fn accumulate(mut self, name: &str, accumulator: Accumulator) -> Self {
        self.fields.push((name.to_string(), accumulator));
        self
    }

    pub fn count(self, name: &str) -> Self {
        self.accumulate(name, Accumulator::Sum(Operand::Literal(1.0)))
    }

    pub fn sum(self, name: &str, field: &str) -> Self {
        self.accumulate(name, Accumulator::Sum(Operand::Field(field.to_string())))
    }

    pub fn avg(self, name: &str, field: &str) -> Self {
        self.accumulate(name, Accumulator::Avg(field.to_string()))
    }

    pub fn min(self, name: &str, field: &str) -> Self {
        self.accumulate(name, Accumulator::Min(field.to_string()))
    }

    pub fn max(self, name: &str, field: &str) -> Self {
        self.accumulate(name, Accumulator::Max(field.to_string()))
    }

    pub fn push(self, name: &str, field: &str) -> Self {
        self.accumulate(name, Accumulator::Push(field.to_string()))
    }

    pub fn first(self, name: &str, field: &str) -> Self {
        self.accumulate(name, Accumulator::First(field.to_string()))
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (name, _) in &self.fields {
            if name.is_empty() || name == "_id" || name.contains('.') {
                return Err(NoSqlError::invalid(format!(
                    "invalid group output field '{}'",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(NoSqlError::invalid(format!(
                    "duplicate group output field '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    fn execute(&self, rows: Vec<Value>) -> Vec<Value> {
        let mut order: Vec<(Value, Vec<AccState>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for row in &rows {
            let key = match &self.key {
                Some(field) => lookup(row, field).cloned().unwrap_or(Value::Null),
                None => Value::Null,
            };
            let slot = *index.entry(key.to_string()).or_insert_with(|| {
                order.push((
                    key.clone(),
                    self.fields.iter().map(|(_, acc)| AccState::new(acc)).collect(),
                ));
                order.len() - 1
            });
            for ((_, acc), state) in self.fields.iter().zip(order[slot].1.iter_mut()) {
                state.feed(acc, row);
            }
        }

        order
            .into_iter()
            .map(|(key, states)| {
                let mut out = Map::new();
                out.insert("_id".to_string(), key);
                for ((name, _), state) in self.fields.iter().zip(states) {
                    out.insert(name.clone(), state.finish());
                }
                Value::Object(out)
            })
            .collect()
    }
}

#[derive(Debug)]
enum AccState {
    Sum { int: i64, float: f64, integral: bool },
    Avg { total: f64, count: u64 },
    Extreme { best: Option<Value>, max: bool },
    Push(Vec<Value>),
    First(Option<Value>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => AccState::Sum {
                int: 0,
                float: 0.0,
                integral: true,
            },
            Accumulator::Avg(_) => AccState::Avg {
                total: 0.0,
                count: 0,
            },
            Accumulator::Min(_) => AccState::Extreme {
                best: None,
                max: false,
            },
            Accumulator::Max(_) => AccState::Extreme {
                best: None,
                max: true,
            },
            Accumulator::Push(_) => AccState::Push(Vec::new()),
            Accumulator::First(_) => AccState::First(None),
        }
    }

    fn feed(&mut self, acc: &Accumulator, row: &Value) {
        match (self, acc) {
            (AccState::Sum { int, float, integral }, Accumulator::Sum(operand)) => {
                let number = match operand {
                    Operand::Literal(n) => Some(Value::from(*n)),
                    Operand::Field(field) => lookup(row, field).filter(|v| v.is_number()).cloned(),
                };
                let Some(Value::Number(n)) = number else {
                    return;
                };
                *float += n.as_f64().unwrap_or(0.0);
                if *integral {
                    match as_integer(&n).and_then(|i| int.checked_add(i)) {
                        Some(sum) => *int = sum,
                        None => *integral = false,
                    }
                }
            }
            (AccState::Avg { total, count }, Accumulator::Avg(field)) => {
                if let Some(n) = lookup(row, field).and_then(Value::as_f64) {
                    *total += n;
                    *count += 1;
                }
            }
            (
                AccState::Extreme { best, max },
                Accumulator::Min(field) | Accumulator::Max(field),
            ) => {
                let Some(value) = lookup(row, field).filter(|v| !v.is_null()) else {
                    return;
                };
                let replace = match best {
                    None => true,
                    Some(current) => {
                        let ordering = compare_any(value, current);
                        if *max {
                            ordering.is_gt()
                        } else {
                            ordering.is_lt()
                        }
                    }
                };
                if replace {
                    *best = Some(value.clone());
                }
            }
            (AccState::Push(items), Accumulator::Push(field)) => {
                if let Some(value) = lookup(row, field) {
                    items.push(value.clone());
                }
            }
            (AccState::First(first), Accumulator::First(field)) => {
                if first.is_none() {
                    *first = Some(lookup(row, field).cloned().unwrap_or(Value::Null));
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum {
                int,
                float,
                integral,
            } => {
                if integral {
                    Value::from(int)
                } else {
                    Value::from(float)
                }
            }
            AccState::Avg { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::from(total / count as f64)
                }
            }
            AccState::Extreme { best, .. } => best.unwrap_or(Value::Null),
            AccState::Push(items) => Value::Array(items),
            AccState::First(first) => first.unwrap_or(Value::Null),
        }
    }
}

/// Integral view of a number, accepting whole floats
fn as_integer(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
            .map(|f| f as i64)
    })
}

/// How a field appears in a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    Include,
    Exclude,
    /// Output the value found at another path
    From(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "spec", rename_all = "snake_case")]
pub enum Stage {
    Match(Filter),
    Group(GroupStage),
    Sort(Vec<SortKey>),
    Project(Vec<(String, Projection)>),
    Skip(usize),
    Limit(usize),
}

/// Ordered aggregation stages
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.stages.push(Stage::Match(filter));
        self
    }

    pub fn group(mut self, group: GroupStage) -> Self {
        self.stages.push(Stage::Group(group));
        self
    }

    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.stages.push(Stage::Sort(keys));
        self
    }

    pub fn project(mut self, fields: Vec<(String, Projection)>) -> Self {
        self.stages.push(Stage::Project(fields));
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.stages.push(Stage::Skip(n));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.stages.push(Stage::Limit(n));
        self
    }

    /// Whether the first stage is a text search
    pub fn starts_with_text(&self) -> bool {
        matches!(self.stages.first(), Some(Stage::Match(filter)) if filter.has_text())
    }

    pub fn validate(&self) -> Result<()> {
        for (position, stage) in self.stages.iter().enumerate() {
            match stage {
                Stage::Match(filter) => {
                    if position > 0 && filter.has_text() {
                        return Err(NoSqlError::invalid(
                            "text search is only allowed in the first pipeline stage",
                        ));
                    }
                    filter.compile()?;
                }
                Stage::Group(group) => group.validate()?,
                Stage::Sort(keys) => {
                    if keys.is_empty() {
                        return Err(NoSqlError::invalid("sort stage needs at least one key"));
                    }
                    if keys.contains(&SortKey::TextScore) {
                        return Err(NoSqlError::invalid(
                            "pipelines cannot sort by relevance score",
                        ));
                    }
                }
                Stage::Project(fields) => {
                    if fields.is_empty() {
                        return Err(NoSqlError::invalid("project stage needs at least one field"));
                    }
                }
                Stage::Limit(0) => {
                    return Err(NoSqlError::invalid("limit must be positive"));
                }
                Stage::Skip(_) | Stage::Limit(_) => {}
            }
        }
        Ok(())
    }

    /// Run over a collection's documents.
    ///
    /// `text_index` is required when the first stage searches text.
    pub fn execute(
        &self,
        collection: &str,
        docs: Vec<Document>,
        text_index: Option<&TextIndex>,
    ) -> Result<Vec<Value>> {
        self.validate()?;

        let (mut rows, rest): (Vec<Value>, &[Stage]) = match self.stages.split_first() {
            Some((Stage::Match(filter), rest)) if filter.has_text() => {
                let compiled = filter.compile()?;
                let index = text_index
                    .ok_or_else(|| NoSqlError::MissingTextIndex(collection.to_string()))?;
                let rows: Vec<Value> = match compiled.text() {
                    Some(query) => docs
                        .iter()
                        .filter(|doc| compiled.matches(*doc))
                        .filter(|doc| index.score(query, doc).is_some())
                        .map(Document::to_json)
                        .collect(),
                    None => Vec::new(),
                };
                (rows, rest)
            }
            _ => (docs.iter().map(Document::to_json).collect(), self.stages.as_slice()),
        };

        for stage in rest {
            rows = match stage {
                Stage::Match(filter) => {
                    let compiled = filter.compile()?;
                    rows.into_iter().filter(|row| compiled.matches(row)).collect()
                }
                Stage::Group(group) => group.execute(rows),
                Stage::Sort(keys) => {
                    sort_by_keys(&mut rows, keys);
                    rows
                }
                Stage::Project(fields) => rows.iter().map(|row| project(row, fields)).collect(),
                Stage::Skip(n) => rows.into_iter().skip(*n).collect(),
                Stage::Limit(n) => rows.into_iter().take(*n).collect(),
            };
        }

        Ok(rows)
    }
}

fn project(row: &Value, fields: &[(String, Projection)]) -> Value {
    let inclusive = fields
        .iter()
        .any(|(_, p)| !matches!(p, Projection::Exclude));

    if !inclusive {
        let mut out = row.as_object().cloned().unwrap_or_default();
        for (field, _) in fields {
            out.remove(field);
        }
        return Value::Object(out);
    }

    let mut out = Map::new();
    let id_excluded = fields
        .iter()
        .any(|(f, p)| f == "_id" && *p == Projection::Exclude);
    if !id_excluded {
        if let Some(id) = row.get("_id") {
            out.insert("_id".to_string(), id.clone());
        }
    }
    for (field, projection) in fields {
        let value = match projection {
            Projection::Include => lookup(row, field),
            Projection::From(path) => lookup(row, path),
            Projection::Exclude => None,
        };
        if let Some(value) = value {
            out.insert(field.clone(), value.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Document> {
        vec![
            Document::new(json!({"title": "1984", "author": "George Orwell", "genre": "Dystopian", "price": 15, "pages": 328})),
            Document::new(json!({"title": "Animal Farm", "author": "George Orwell", "genre": "Dystopian", "price": 10, "pages": 112})),
            Document::new(json!({"title": "Emma", "author": "Jane Austen", "genre": "Romance", "price": 7.5, "pages": 474})),
        ]
    }

    #[test]
    fn test_group_by_author() {
        let pipeline = Pipeline::new()
            .group(
                GroupStage::by("author")
                    .count("bookCount")
                    .push("books", "title")
                    .avg("avgPrice", "price"),
            )
            .filter(Filter::gt("bookCount", 1))
            .sort(vec![SortKey::desc("avgPrice")]);

        let rows = pipeline.execute("books", docs(), None).unwrap();
        assert_eq!(
            rows,
            vec![json!({
                "_id": "George Orwell",
                "bookCount": 2,
                "books": ["1984", "Animal Farm"],
                "avgPrice": 12.5
            })]
        );
    }

    #[test]
    fn test_group_sums_and_extremes() {
        let rows = Pipeline::new()
            .group(
                GroupStage::all()
                    .sum("totalPages", "pages")
                    .sum("totalPrice", "price")
                    .min("cheapest", "price")
                    .max("longest", "pages")
                    .first("firstTitle", "title"),
            )
            .execute("books", docs(), None)
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["totalPages"], json!(914));
        assert_eq!(rows[0]["totalPrice"], json!(32.5));
        assert_eq!(rows[0]["cheapest"], json!(7.5));
        assert_eq!(rows[0]["longest"], json!(474));
        assert_eq!(rows[0]["firstTitle"], json!("1984"));
    }

    #[test]
    fn test_avg_of_nothing_is_null() {
        let rows = Pipeline::new()
            .group(GroupStage::by("genre").avg("avgRating", "rating"))
            .sort(vec![SortKey::asc("_id")])
            .execute("books", docs(), None)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["_id"], json!("Dystopian"));
        assert!(rows[0]["avgRating"].is_null());
    }

    #[test]
    fn test_project_skip_limit() {
        let rows = Pipeline::new()
            .sort(vec![SortKey::asc("price")])
            .skip(1)
            .limit(1)
            .project(vec![
                ("_id".into(), Projection::Exclude),
                ("name".into(), Projection::From("title".into())),
            ])
            .execute("books", docs(), None)
            .unwrap();
        assert_eq!(rows, vec![json!({"name": "Animal Farm"})]);
    }

    #[test]
    fn test_text_stage_placement() {
        let late_text = Pipeline::new()
            .group(GroupStage::by("genre").count("n"))
            .filter(Filter::text("orwell"));
        assert!(late_text.validate().is_err());
        assert!(!late_text.starts_with_text());

        let early_text = Pipeline::new().filter(Filter::text("orwell"));
        assert!(early_text.starts_with_text());
        let err = early_text
            .execute("books", docs(), None)
            .unwrap_err();
        assert!(matches!(err, NoSqlError::MissingTextIndex(_)));
    }

    #[test]
    fn test_validate_rejects_bad_groups() {
        let dup = Pipeline::new().group(GroupStage::by("genre").count("n").count("n"));
        assert!(dup.validate().is_err());
        assert!(Pipeline::new().limit(0).validate().is_err());
    }
}
