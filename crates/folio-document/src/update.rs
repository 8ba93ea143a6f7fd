//! Folio Update Operators
//!
//! Parsing and application of update documents (`{$set: {price: 15.5}}`).
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::QueryError;
use crate::expr::arithmetic;
use crate::types::{Document, Value};

// =============================================================================
// Update Specification
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum UpdateOp {
    Set { path: String, value: Value },
    Unset { path: String },
    Inc { path: String, amount: Value },
    Mul { path: String, factor: Value },
}

/// A parsed update document. Operators apply in the order written.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    pub fn parse(doc: &Document) -> Result<Self, QueryError> {
        if doc.is_empty() {
            return Err(QueryError::InvalidUpdate(
                "update document must not be empty".to_string(),
            ));
        }

        let mut ops = Vec::new();
        for (operator, args) in doc.iter() {
            if !operator.starts_with('$') {
                return Err(QueryError::InvalidUpdate(format!(
                    "'{}' is not an update operator",
                    operator
                )));
            }

            let fields = args.as_document().ok_or_else(|| {
                QueryError::InvalidUpdate(format!("{} expects a document", operator))
            })?;
            if fields.is_empty() {
                return Err(QueryError::InvalidUpdate(format!(
                    "{} has no fields",
                    operator
                )));
            }

            for (path, value) in fields.iter() {
                check_path(path)?;
                let path = path.to_string();
                let op = match operator {
                    "$set" => UpdateOp::Set {
                        path,
                        value: value.clone(),
                    },
                    "$unset" => UpdateOp::Unset { path },
                    "$inc" => UpdateOp::Inc {
                        amount: numeric_arg(operator, &path, value)?,
                        path,
                    },
                    "$mul" => UpdateOp::Mul {
                        factor: numeric_arg(operator, &path, value)?,
                        path,
                    },
                    other => return Err(QueryError::UnsupportedOperator(other.to_string())),
                };
                ops.push(op);
            }
        }

        Ok(Self { ops })
    }

    /// Apply to a copy of `doc`. Returns `None` when the update leaves the
    /// document unchanged.
    pub fn apply(&self, doc: &Document) -> Result<Option<Document>, QueryError> {
        let mut updated = doc.clone();

        for op in &self.ops {
            match op {
                UpdateOp::Set { path, value } => set(&mut updated, path, value.clone())?,
                UpdateOp::Unset { path } => {
                    updated.remove_path(path);
                }
                UpdateOp::Inc { path, amount } => {
                    let next = match updated.get(path) {
                        None | Some(Value::Null) => amount.clone(),
                        Some(current) => {
                            arithmetic(current, amount, i64::checked_add, |x, y| x + y)?
                        }
                    };
                    set(&mut updated, path, next)?;
                }
                UpdateOp::Mul { path, factor } => {
                    let next = match updated.get(path) {
                        None | Some(Value::Null) => match factor {
                            Value::Int(_) => Value::Int(0),
                            _ => Value::Float(0.0),
                        },
                        Some(current) => {
                            arithmetic(current, factor, i64::checked_mul, |x, y| x * y)?
                        }
                    };
                    set(&mut updated, path, next)?;
                }
            }
        }

        Ok((updated != *doc).then_some(updated))
    }

    /// Field paths touched by this update.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().map(|op| match op {
            UpdateOp::Set { path, .. }
            | UpdateOp::Unset { path }
            | UpdateOp::Inc { path, .. }
            | UpdateOp::Mul { path, .. } => path.as_str(),
        })
    }
}

fn check_path(path: &str) -> Result<(), QueryError> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(QueryError::InvalidUpdate(format!(
            "invalid field path '{}'",
            path
        )));
    }
    if path == "_id" || path.starts_with("_id.") {
        return Err(QueryError::InvalidUpdate(
            "the _id field is immutable".to_string(),
        ));
    }
    Ok(())
}

fn numeric_arg(operator: &str, path: &str, value: &Value) -> Result<Value, QueryError> {
    if value.is_number() {
        Ok(value.clone())
    } else {
        Err(QueryError::InvalidUpdate(format!(
            "{} on '{}' requires a numeric argument, got {}",
            operator,
            path,
            value.type_name()
        )))
    }
}

fn set(doc: &mut Document, path: &str, value: Value) -> Result<(), QueryError> {
    if doc.set_path(path, value) {
        Ok(())
    } else {
        Err(QueryError::InvalidUpdate(format!(
            "cannot create field '{}' inside a non-document value",
            path
        )))
    }
}

// =============================================================================
// Tests
// =============================================================================
