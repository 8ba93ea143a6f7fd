//! Folio Document Query
//!
//! Query language for document filtering and retrieval. Filters, sort
//! specifications and projections are parsed from the same document grammar
//! the query shell uses (`{published_year: {$gt: 2000}}`).
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::QueryError;
use crate::explain::QueryPlan;
use crate::expr::Expr;
use crate::types::{Document, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// =============================================================================
// Query
// =============================================================================

/// A find request: filter plus optional sort, pagination and projection.
#[derive(Debug, Clone)]
pub struct Query {
    pub filter: Filter,
    pub sort: Option<SortSpec>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub projection: Option<Projection>,
}

impl Query {
    pub fn new() -> Self {
        Self {
            filter: Filter::all(),
            sort: None,
            skip: None,
            limit: None,
            projection: None,
        }
    }

    /// Build a query from filter and projection documents.
    pub fn from_documents(
        filter: &Document,
        projection: Option<&Document>,
    ) -> Result<Self, QueryError> {
        let mut query = Self::new().with_filter(Filter::parse(filter)?);
        if let Some(projection) = projection {
            query = query.with_projection(Projection::parse(projection)?);
        }
        Ok(query)
    }

    /// Check if a document matches this query.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filter.matches(doc)
    }

    /// Add a filter, ANDed with any existing one.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = match self.filter {
            Filter::And(existing) if existing.is_empty() => filter,
            existing => Filter::And(vec![existing, filter]),
        };
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Filter
// =============================================================================

/// A filter condition.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
    Regex { field: String, regex: regex::Regex },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// A filter matching every document.
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Parse a filter document. Conditions on different fields are ANDed.
    pub fn parse(doc: &Document) -> Result<Self, QueryError> {
        let mut filters = Vec::with_capacity(doc.len());

        for (key, condition) in doc.iter() {
            let filter = match key {
                "$and" => Self::And(parse_filter_list(key, condition)?),
                "$or" => Self::Or(parse_filter_list(key, condition)?),
                "$nor" => Self::Nor(parse_filter_list(key, condition)?),
                op if op.starts_with('$') => {
                    return Err(QueryError::UnsupportedOperator(op.to_string()))
                }
                field => parse_field_condition(field, condition)?,
            };
            filters.push(filter);
        }

        Ok(match filters.len() {
            1 => filters.remove(0),
            _ => Self::And(filters),
        })
    }

    /// Check if a document matches this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq { field, value } => eq_matches(doc.get(field), value),
            Self::Ne { field, value } => !eq_matches(doc.get(field), value),
            Self::Gt { field, value } => compare_matches(doc.get(field), value, |o| {
                o == Ordering::Greater
            }),
            Self::Gte { field, value } => compare_matches(doc.get(field), value, |o| {
                o != Ordering::Less
            }),
            Self::Lt { field, value } => compare_matches(doc.get(field), value, |o| {
                o == Ordering::Less
            }),
            Self::Lte { field, value } => compare_matches(doc.get(field), value, |o| {
                o != Ordering::Greater
            }),
            Self::In { field, values } => {
                let found = doc.get(field);
                values.iter().any(|v| eq_matches(found, v))
            }
            Self::Nin { field, values } => {
                let found = doc.get(field);
                !values.iter().any(|v| eq_matches(found, v))
            }
            Self::Exists { field, exists } => doc.contains(field) == *exists,
            Self::Regex { field, regex } => candidates(doc.get(field))
                .iter()
                .any(|v| v.as_str().map(|s| regex.is_match(s)).unwrap_or(false)),
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Nor(filters) => !filters.iter().any(|f| f.matches(doc)),
            Self::Not(filter) => !filter.matches(doc),
        }
    }

    /// Top-level equality constraints usable for an index lookup.
    pub fn equality_constraints(&self) -> Vec<(&str, &Value)> {
        match self {
            Self::Eq { field, value } if !value.is_null() => vec![(field.as_str(), value)],
            Self::And(filters) => filters
                .iter()
                .flat_map(|f| f.equality_constraints())
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn parse_filter_list(op: &str, condition: &Value) -> Result<Vec<Filter>, QueryError> {
    let items = condition.as_array().ok_or_else(|| {
        QueryError::InvalidFilter(format!("{} expects an array of filter documents", op))
    })?;
    if items.is_empty() {
        return Err(QueryError::InvalidFilter(format!(
            "{} expects a non-empty array",
            op
        )));
    }

    items
        .iter()
        .map(|item| match item {
            Value::Object(doc) => Filter::parse(doc),
            other => Err(QueryError::InvalidFilter(format!(
                "{} entries must be documents, got {}",
                op,
                other.type_name()
            ))),
        })
        .collect()
}

fn is_operator_document(value: &Value) -> bool {
    value
        .as_document()
        .and_then(|doc| doc.first())
        .map(|(key, _)| key.starts_with('$'))
        .unwrap_or(false)
}

/// Parse a condition on a single field: either an implicit equality or an
/// operator document. Multiple operators on one field are ANDed.
fn parse_field_condition(field: &str, condition: &Value) -> Result<Filter, QueryError> {
    let ops = match condition {
        Value::Object(ops) if is_operator_document(condition) => ops,
        _ => {
            return Ok(Filter::Eq {
                field: field.to_string(),
                value: condition.clone(),
            })
        }
    };

    let mut filters = Vec::with_capacity(ops.len());

    for (op, value) in ops.iter() {
        let field = field.to_string();
        let filter = match op {
            "$eq" => Filter::Eq { field, value: value.clone() },
            "$ne" => Filter::Ne { field, value: value.clone() },
            "$gt" => Filter::Gt { field, value: value.clone() },
            "$gte" => Filter::Gte { field, value: value.clone() },
            "$lt" => Filter::Lt { field, value: value.clone() },
            "$lte" => Filter::Lte { field, value: value.clone() },
            "$in" | "$nin" => {
                let values = value.as_array().cloned().ok_or_else(|| {
                    QueryError::InvalidFilter(format!("{} on '{}' expects an array", op, field))
                })?;
                if op == "$in" {
                    Filter::In { field, values }
                } else {
                    Filter::Nin { field, values }
                }
            }
            "$exists" => Filter::Exists {
                field,
                exists: truthy(value),
            },
            "$regex" => {
                let pattern = value.as_str().ok_or_else(|| {
                    QueryError::InvalidFilter(format!("$regex on '{}' expects a string", field))
                })?;
                let regex = regex::RegexBuilder::new(pattern)
                    .size_limit(1024 * 1024)
                    .build()
                    .map_err(|e| QueryError::InvalidRegex(e.to_string()))?;
                Filter::Regex { field, regex }
            }
            "$not" => {
                if !is_operator_document(value) {
                    return Err(QueryError::InvalidFilter(format!(
                        "$not on '{}' expects an operator document",
                        field
                    )));
                }
                Filter::Not(Box::new(parse_field_condition(&field, value)?))
            }
            other if other.starts_with('$') => {
                return Err(QueryError::UnsupportedOperator(other.to_string()))
            }
            other => {
                return Err(QueryError::InvalidFilter(format!(
                    "cannot mix operators and field '{}' in condition on '{}'",
                    other, field
                )))
            }
        };
        filters.push(filter);
    }

    Ok(match filters.len() {
        1 => filters.remove(0),
        _ => Filter::And(filters),
    })
}

/// The stored value plus, for arrays, each element.
fn candidates(found: Option<&Value>) -> Vec<&Value> {
    match found {
        Some(value) => match value {
            Value::Array(items) => {
                let mut all: Vec<&Value> = items.iter().collect();
                all.push(value);
                all
            }
            _ => vec![value],
        },
        None => Vec::new(),
    }
}

fn eq_matches(found: Option<&Value>, target: &Value) -> bool {
    match found {
        None => target.is_null(),
        Some(_) => candidates(found).iter().any(|v| values_equal(v, target)),
    }
}

fn compare_matches(found: Option<&Value>, target: &Value, accept: fn(Ordering) -> bool) -> bool {
    candidates(found)
        .iter()
        .any(|v| compare_values(v, target).map(accept).unwrap_or(false))
}

/// Truthiness of flag values such as `1`, `0`, `true`.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(n) => *n != 0,
        Value::Float(f) => *f != 0.0,
        _ => true,
    }
}

// =============================================================================
// Value Ordering
// =============================================================================

/// Compare two values of the same kind; `None` when they are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Equality with numeric values compared across int and double.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            compare_values(a, b) == Some(Ordering::Equal)
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => a == b,
    }
}

/// Total order used for sorting; values of different types order by type.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    let rank = a.type_rank().cmp(&b.type_rank());
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| sort_order(x, y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => a
            .iter()
            .zip(b.iter())
            .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| sort_order(va, vb)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

// =============================================================================
// Sort
// =============================================================================

/// Sort direction: `1` ascending, `-1` descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        match value.as_i64() {
            Some(1) => Ok(Self::Ascending),
            Some(-1) => Ok(Self::Descending),
            _ => Err(QueryError::InvalidSort(format!(
                "direction must be 1 or -1, got {}",
                value
            ))),
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }
}

/// Ordered multi-key sort specification, written as `{price: 1, title: -1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Document", into = "Document")]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    /// Parse from a document; keys keep their written order.
    pub fn parse(doc: &Document) -> Result<Self, QueryError> {
        if doc.is_empty() {
            return Err(QueryError::InvalidSort(
                "sort specification must name at least one field".to_string(),
            ));
        }
        let keys = doc
            .iter()
            .map(|(field, dir)| Ok(SortKey::new(field, SortDirection::from_value(dir)?)))
            .collect::<Result<Vec<_>, QueryError>>()?;
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The same keys with every direction flipped.
    pub fn reversed(&self) -> Self {
        Self {
            keys: self
                .keys
                .iter()
                .map(|k| SortKey::new(k.field.clone(), k.direction.reverse()))
                .collect(),
        }
    }

    /// Compare two documents key by key; missing fields sort as null.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.keys {
            let a_val = a.get(&key.field).unwrap_or(&Value::Null);
            let b_val = b.get(&key.field).unwrap_or(&Value::Null);

            let cmp = sort_order(a_val, b_val);
            if cmp != Ordering::Equal {
                return match key.direction {
                    SortDirection::Ascending => cmp,
                    SortDirection::Descending => cmp.reverse(),
                };
            }
        }
        Ordering::Equal
    }

    /// Stable in-place sort.
    pub fn sort(&self, docs: &mut [Document]) {
        docs.sort_by(|a, b| self.compare(a, b));
    }

    pub fn to_document(&self) -> Document {
        self.keys
            .iter()
            .map(|k| (k.field.clone(), Value::Int(k.direction.as_i64())))
            .collect()
    }
}

impl TryFrom<Document> for SortSpec {
    type Error = QueryError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        Self::parse(&doc)
    }
}

impl From<SortSpec> for Document {
    fn from(spec: SortSpec) -> Self {
        spec.to_document()
    }
}

// =============================================================================
// Projection
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum ProjectField {
    Include,
    Exclude,
    Computed(Expr),
}

/// Field inclusion, exclusion or computation applied to result documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    fields: Vec<(String, ProjectField)>,
    include_id: bool,
    inclusive: bool,
}

impl Projection {
    pub fn parse(doc: &Document) -> Result<Self, QueryError> {
        let mut fields = Vec::with_capacity(doc.len());
        let mut include_id = true;
        let mut has_inclusion = false;
        let mut has_exclusion = false;

        for (name, spec) in doc.iter() {
            let is_flag = matches!(spec, Value::Bool(_) | Value::Int(_) | Value::Float(_));

            if name == "_id" && is_flag {
                include_id = truthy(spec);
                continue;
            }

            let field = if is_flag {
                if truthy(spec) {
                    has_inclusion = true;
                    ProjectField::Include
                } else {
                    has_exclusion = true;
                    ProjectField::Exclude
                }
            } else {
                has_inclusion = true;
                ProjectField::Computed(Expr::parse(spec)?)
            };
            fields.push((name.to_string(), field));
        }

        if has_inclusion && has_exclusion {
            return Err(QueryError::InvalidProjection(
                "cannot mix inclusion and exclusion of fields other than _id".to_string(),
            ));
        }

        Ok(Self {
            fields,
            include_id,
            inclusive: has_inclusion,
        })
    }

    /// Apply the projection, producing a new document.
    pub fn apply(&self, doc: &Document) -> Result<Document, QueryError> {
        if !self.inclusive {
            let mut out = doc.clone();
            for (name, _) in &self.fields {
                out.remove_path(name);
            }
            if !self.include_id {
                out.remove("_id");
            }
            return Ok(out);
        }

        let mut out = Document::new();
        if self.include_id {
            if let Some(id) = doc.id() {
                out.set("_id", id.clone());
            }
        }

        for (name, field) in &self.fields {
            let value = match field {
                ProjectField::Include | ProjectField::Exclude => doc.get(name).cloned(),
                ProjectField::Computed(expr) => match expr.as_field() {
                    Some(path) => doc.get(path).cloned(),
                    None => Some(expr.evaluate(doc)?),
                },
            };
            if let Some(value) = value {
                if !out.set_path(name, value) {
                    return Err(QueryError::InvalidProjection(format!(
                        "cannot project into '{}'",
                        name
                    )));
                }
            }
        }

        Ok(out)
    }
}

// =============================================================================
// Query Result
// =============================================================================

/// Result of a document query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub documents: Vec<Document>,
    pub plan: QueryPlan,
    pub total_scanned: usize,
    pub keys_examined: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn count(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }
}

// =============================================================================
// Tests
// =============================================================================
