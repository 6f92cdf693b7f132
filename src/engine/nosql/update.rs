//! Field-level update documents

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::Document;
use super::error::{NoSqlError, Result};

/// A single update operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UpdateOp {
    /// Replace a field's value
    Set { field: String, value: Value },
    /// Remove a field
    Unset { field: String },
    /// Add to a numeric field, treating a missing field as zero
    Inc { field: String, by: f64 },
}

/// Ordered list of update operations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Update {
    pub ops: Vec<UpdateOp>,
}

/// Outcome of an update call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn unset(mut self, field: &str) -> Self {
        self.ops.push(UpdateOp::Unset {
            field: field.to_string(),
        });
        self
    }

    pub fn inc(mut self, field: &str, by: f64) -> Self {
        self.ops.push(UpdateOp::Inc {
            field: field.to_string(),
            by,
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ops.is_empty() {
            return Err(NoSqlError::invalid("update has no operations"));
        }
        for op in &self.ops {
            let field = match op {
                UpdateOp::Set { field, .. } | UpdateOp::Unset { field } => field,
                UpdateOp::Inc { field, by } => {
                    if !by.is_finite() {
                        return Err(NoSqlError::invalid(format!(
                            "increment for '{}' must be finite",
                            field
                        )));
                    }
                    field
                }
            };
            if field.is_empty() || field == "_id" || field.starts_with("_created") || field.starts_with("_modified") {
                return Err(NoSqlError::invalid(format!(
                    "field '{}' cannot be updated",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Apply to a document. Returns `true` when any stored value changed.
    pub fn apply(&self, doc: &mut Document) -> Result<bool> {
        let mut changed = false;
        for op in &self.ops {
            changed |= match op {
                UpdateOp::Set { field, value } => doc.set(field, value.clone()),
                UpdateOp::Unset { field } => doc.unset(field),
                UpdateOp::Inc { field, by } => {
                    let current = match doc.get(field) {
                        None | Some(Value::Null) => 0.0,
                        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                        Some(_) => {
                            return Err(NoSqlError::invalid(format!(
                                "cannot increment non-numeric field '{}'",
                                field
                            )))
                        }
                    };
                    *by != 0.0 && doc.set(field, Value::from(current + by))
                }
            };
        }
        Ok(changed)
    }
}
