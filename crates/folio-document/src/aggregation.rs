//! Folio Aggregation Pipeline
//!
//! Stage-by-stage transformation of documents: `$match`, `$group`,
//! `$project`, `$sort`, `$limit`, `$skip` and `$count`. Stages run strictly
//! in the order listed.
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::QueryError;
use crate::expr::{arithmetic, Expr};
use crate::index::IndexKey;
use crate::query::{sort_order, Filter, Projection, SortSpec};
use crate::types::{Document, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

// =============================================================================
// Pipeline
// =============================================================================

/// A parsed aggregation pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Parse stage documents. Each stage is a document with exactly one
    /// `$`-prefixed key.
    pub fn parse(stages: &[Document]) -> Result<Self, QueryError> {
        let stages = stages
            .iter()
            .enumerate()
            .map(|(i, doc)| Stage::parse(doc).map_err(|e| stage_error(i, e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Operator names of the stages in order.
    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    /// The filter of a leading `$match`, usable for index selection.
    pub fn leading_match(&self) -> Option<&Filter> {
        match self.stages.first() {
            Some(Stage::Match(filter)) => Some(filter),
            _ => None,
        }
    }

    /// Run every stage over `docs`.
    pub fn execute(&self, docs: Vec<Document>) -> Result<Vec<Document>, QueryError> {
        self.stages
            .iter()
            .try_fold(docs, |docs, stage| stage.execute(docs))
    }
}

fn stage_error(index: usize, err: QueryError) -> QueryError {
    match err {
        QueryError::InvalidPipeline(msg) => {
            QueryError::InvalidPipeline(format!("stage {}: {}", index, msg))
        }
        other => other,
    }
}

// =============================================================================
// Stage
// =============================================================================

/// A single pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Group(GroupStage),
    Project(Projection),
    Sort(SortSpec),
    Limit(usize),
    Skip(usize),
    Count(String),
}

impl Stage {
    pub fn parse(doc: &Document) -> Result<Self, QueryError> {
        let (name, spec) = match doc.first() {
            Some((name, spec)) if doc.len() == 1 && name.starts_with('$') => (name, spec),
            _ => {
                return Err(QueryError::InvalidPipeline(
                    "a stage must be a document with exactly one $-operator".to_string(),
                ))
            }
        };

        match name {
            "$match" => Ok(Self::Match(Filter::parse(stage_document(name, spec)?)?)),
            "$group" => Ok(Self::Group(GroupStage::parse(stage_document(name, spec)?)?)),
            "$project" => Ok(Self::Project(Projection::parse(stage_document(
                name, spec,
            )?)?)),
            "$sort" => Ok(Self::Sort(SortSpec::parse(stage_document(name, spec)?)?)),
            "$limit" => match spec.as_i64() {
                Some(n) if n > 0 => Ok(Self::Limit(n as usize)),
                _ => Err(QueryError::InvalidPipeline(
                    "$limit must be a positive integer".to_string(),
                )),
            },
            "$skip" => match spec.as_i64() {
                Some(n) if n >= 0 => Ok(Self::Skip(n as usize)),
                _ => Err(QueryError::InvalidPipeline(
                    "$skip must be a non-negative integer".to_string(),
                )),
            },
            "$count" => match spec.as_str() {
                Some(field) if !field.is_empty() && !field.starts_with('$') && !field.contains('.') => {
                    Ok(Self::Count(field.to_string()))
                }
                _ => Err(QueryError::InvalidPipeline(
                    "$count requires a plain, non-empty field name".to_string(),
                )),
            },
            other => Err(QueryError::UnsupportedOperator(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Group(_) => "$group",
            Self::Project(_) => "$project",
            Self::Sort(_) => "$sort",
            Self::Limit(_) => "$limit",
            Self::Skip(_) => "$skip",
            Self::Count(_) => "$count",
        }
    }

    pub fn execute(&self, docs: Vec<Document>) -> Result<Vec<Document>, QueryError> {
        match self {
            Self::Match(filter) => Ok(docs.into_iter().filter(|d| filter.matches(d)).collect()),
            Self::Group(group) => group.execute(&docs),
            Self::Project(projection) => docs.iter().map(|d| projection.apply(d)).collect(),
            Self::Sort(sort) => {
                let mut docs = docs;
                sort.sort(&mut docs);
                Ok(docs)
            }
            Self::Limit(n) => Ok(docs.into_iter().take(*n).collect()),
            Self::Skip(n) => Ok(docs.into_iter().skip(*n).collect()),
            Self::Count(field) => {
                if docs.is_empty() {
                    return Ok(Vec::new());
                }
                let mut out = Document::new();
                out.set(field.clone(), docs.len());
                Ok(vec![out])
            }
        }
    }
}

fn stage_document<'a>(name: &str, spec: &'a Value) -> Result<&'a Document, QueryError> {
    spec.as_document()
        .ok_or_else(|| QueryError::InvalidPipeline(format!("{} expects a document", name)))
}

// =============================================================================
// Group Stage
// =============================================================================

/// `$group`: bucket documents by the `_id` expression and fold accumulators.
#[derive(Debug, Clone)]
pub struct GroupStage {
    id: Expr,
    fields: Vec<(String, AccumulatorOp, Expr)>,
}

impl GroupStage {
    pub fn parse(doc: &Document) -> Result<Self, QueryError> {
        let id = doc
            .field("_id")
            .ok_or_else(|| QueryError::InvalidPipeline("$group requires an _id".to_string()))?;
        let id = Expr::parse(id)?;

        let mut fields = Vec::new();
        for (name, spec) in doc.iter().filter(|(name, _)| *name != "_id") {
            if name.contains('.') {
                return Err(QueryError::InvalidPipeline(format!(
                    "group field '{}' cannot contain '.'",
                    name
                )));
            }
            let (op, arg) = match spec.as_document().and_then(|d| d.first().map(|f| (d, f))) {
                Some((d, (op, arg))) if d.len() == 1 => (op, arg),
                _ => {
                    return Err(QueryError::InvalidPipeline(format!(
                        "group field '{}' must be an accumulator object",
                        name
                    )))
                }
            };
            fields.push((name.to_string(), AccumulatorOp::parse(op)?, Expr::parse(arg)?));
        }

        Ok(Self { id, fields })
    }

    /// Groups are emitted in order of first appearance.
    pub fn execute(&self, docs: &[Document]) -> Result<Vec<Document>, QueryError> {
        let mut positions: HashMap<IndexKey, usize> = HashMap::new();
        let mut groups: Vec<(Value, Vec<Accumulator>)> = Vec::new();

        for doc in docs {
            let key = self.id.evaluate(doc)?;
            let slot = *positions
                .entry(IndexKey::from_value(&key))
                .or_insert_with(|| {
                    groups.push((
                        key,
                        self.fields
                            .iter()
                            .map(|(_, op, _)| Accumulator::new(*op))
                            .collect(),
                    ));
                    groups.len() - 1
                });

            let accumulators = &mut groups[slot].1;
            for ((_, _, expr), acc) in self.fields.iter().zip(accumulators.iter_mut()) {
                let value = match expr.as_field() {
                    Some(path) => doc.get(path).cloned(),
                    None => Some(expr.evaluate(doc)?),
                };
                acc.accumulate(value)?;
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, accumulators)| {
                let mut out = Document::new();
                out.set("_id", key);
                for ((name, _, _), acc) in self.fields.iter().zip(accumulators) {
                    out.set(name.clone(), acc.finalize());
                }
                out
            })
            .collect())
    }
}

// =============================================================================
// Accumulators
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorOp {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
}

impl AccumulatorOp {
    pub fn parse(op: &str) -> Result<Self, QueryError> {
        match op {
            "$sum" => Ok(Self::Sum),
            "$avg" => Ok(Self::Avg),
            "$min" => Ok(Self::Min),
            "$max" => Ok(Self::Max),
            "$first" => Ok(Self::First),
            "$last" => Ok(Self::Last),
            "$push" => Ok(Self::Push),
            other => Err(QueryError::UnsupportedOperator(other.to_string())),
        }
    }
}

/// Running state of one accumulator for one group.
struct Accumulator {
    op: AccumulatorOp,
    sum: Value,
    count: usize,
    current: Option<Value>,
    items: Vec<Value>,
}

impl Accumulator {
    fn new(op: AccumulatorOp) -> Self {
        Self {
            op,
            sum: Value::Int(0),
            count: 0,
            current: None,
            items: Vec::new(),
        }
    }

    /// Fold one input. `None` means the field was missing.
    fn accumulate(&mut self, value: Option<Value>) -> Result<(), QueryError> {
        match self.op {
            AccumulatorOp::First => {
                if self.count == 0 {
                    self.current = Some(value.unwrap_or(Value::Null));
                }
                self.count += 1;
            }
            AccumulatorOp::Last => {
                self.current = Some(value.unwrap_or(Value::Null));
            }
            AccumulatorOp::Push => {
                if let Some(value) = value {
                    self.items.push(value);
                }
            }
            // non-numeric inputs are ignored by $sum and $avg
            AccumulatorOp::Sum | AccumulatorOp::Avg => {
                if let Some(value) = value.filter(Value::is_number) {
                    self.sum = arithmetic(&self.sum, &value, i64::checked_add, |x, y| x + y)?;
                    self.count += 1;
                }
            }
            AccumulatorOp::Min | AccumulatorOp::Max => {
                let value = match value {
                    Some(v) if !v.is_null() => v,
                    _ => return Ok(()),
                };
                let wanted = if self.op == AccumulatorOp::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let replace = match &self.current {
                    Some(current) => sort_order(&value, current) == wanted,
                    None => true,
                };
                if replace {
                    self.current = Some(value);
                }
            }
        }
        Ok(())
    }

    fn finalize(self) -> Value {
        match self.op {
            AccumulatorOp::Sum => self.sum,
            AccumulatorOp::Avg => match (self.count, self.sum.as_f64()) {
                (0, _) | (_, None) => Value::Null,
                (n, Some(sum)) => Value::Float(sum / n as f64),
            },
            AccumulatorOp::Push => Value::Array(self.items),
            AccumulatorOp::Min
            | AccumulatorOp::Max
            | AccumulatorOp::First
            | AccumulatorOp::Last => self.current.unwrap_or(Value::Null),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
