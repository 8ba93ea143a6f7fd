//! Folio Document Index
//!
//! Ordered single-field and compound indexes. Index keys are kept in a
//! B-tree so equality lookups on any leading prefix of the key pattern are
//! range scans.
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::QueryError;
use crate::query::{SortDirection, SortKey};
use crate::types::{Document, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// Index Specification
// =============================================================================

/// Ordered key pattern of an index, written as `{author: 1, published_year: -1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Document", into = "Document")]
pub struct IndexSpec {
    keys: Vec<SortKey>,
}

impl IndexSpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    pub fn parse(doc: &Document) -> Result<Self, QueryError> {
        if doc.is_empty() {
            return Err(QueryError::InvalidIndex(
                "index key pattern must name at least one field".to_string(),
            ));
        }

        let mut keys: Vec<SortKey> = Vec::with_capacity(doc.len());
        for (field, dir) in doc.iter() {
            if keys.iter().any(|k| k.field == field) {
                return Err(QueryError::InvalidIndex(format!(
                    "field '{}' appears twice in key pattern",
                    field
                )));
            }
            let direction = SortDirection::from_value(dir)
                .map_err(|_| QueryError::InvalidIndex(format!("bad direction for '{}'", field)))?;
            keys.push(SortKey::new(field, direction));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Generated name, e.g. `author_1_published_year_-1`.
    pub fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|k| format!("{}_{}", k.field, k.direction.as_i64()))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn to_document(&self) -> Document {
        self.keys
            .iter()
            .map(|k| (k.field.clone(), Value::Int(k.direction.as_i64())))
            .collect()
    }
}

impl TryFrom<Document> for IndexSpec {
    type Error = QueryError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        Self::parse(&doc)
    }
}

impl From<IndexSpec> for Document {
    fn from(spec: IndexSpec) -> Self {
        spec.to_document()
    }
}

// =============================================================================
// Index Descriptor
// =============================================================================

/// Description of an index as reported by `list_indexes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub key: IndexSpec,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new(key: IndexSpec) -> Self {
        Self {
            name: key.default_name(),
            key,
            unique: false,
        }
    }

    /// The implicit unique index on `_id`.
    pub fn id_index() -> Self {
        Self {
            name: "_id_".to_string(),
            key: IndexSpec::new(vec![SortKey::ascending("_id")]),
            unique: true,
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.set("v", 2);
        doc.set("key", self.key.to_document());
        doc.set("name", self.name.clone());
        if self.unique {
            doc.set("unique", true);
        }
        doc
    }
}

// =============================================================================
// Document Index
// =============================================================================

/// Positions of matching documents plus the number of index keys visited.
#[derive(Debug, Clone, Default)]
pub struct IndexLookup {
    pub positions: Vec<u64>,
    pub keys_examined: usize,
}

/// Index over document positions in a collection.
pub struct DocumentIndex {
    descriptor: IndexDescriptor,
    entries: BTreeMap<Vec<IndexKey>, BTreeSet<u64>>,
    multikey: bool,
}

impl DocumentIndex {
    pub fn new(descriptor: IndexDescriptor) -> Self {
        Self {
            descriptor,
            entries: BTreeMap::new(),
            multikey: false,
        }
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// True once any indexed value was an array; such indexes are not used
    /// for lookups because array fields match by element.
    pub fn is_multikey(&self) -> bool {
        self.multikey
    }

    fn key_for(&mut self, doc: &Document) -> Vec<IndexKey> {
        self.descriptor
            .key
            .keys()
            .iter()
            .map(|k| match doc.get(&k.field) {
                Some(value) => {
                    if matches!(value, Value::Array(_)) {
                        self.multikey = true;
                    }
                    IndexKey::from_value(value)
                }
                None => IndexKey::Null,
            })
            .collect()
    }

    /// Index a document stored at `position`.
    pub fn insert(&mut self, position: u64, doc: &Document) {
        let key = self.key_for(doc);
        self.entries.entry(key).or_default().insert(position);
    }

    /// Remove a document stored at `position`.
    pub fn remove(&mut self, position: u64, doc: &Document) {
        let key = self.key_for(doc);
        if let Some(positions) = self.entries.get_mut(&key) {
            positions.remove(&position);
            if positions.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Whether a document with these key values is already indexed.
    pub fn contains_values(&self, values: &[Value]) -> bool {
        let key: Vec<IndexKey> = values.iter().map(IndexKey::from_value).collect();
        self.entries.contains_key(&key)
    }

    /// Find positions whose leading key fields equal `prefix`, in
    /// position order.
    pub fn lookup_prefix(&self, prefix: &[Value]) -> IndexLookup {
        let prefix: Vec<IndexKey> = prefix.iter().map(IndexKey::from_value).collect();
        let mut positions = BTreeSet::new();
        let mut keys_examined = 0;

        for (key, ids) in self.entries.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            keys_examined += ids.len();
            positions.extend(ids.iter().copied());
        }

        IndexLookup {
            positions: positions.into_iter().collect(),
            keys_examined,
        }
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.multikey = false;
    }
}

// =============================================================================
// Index Key
// =============================================================================

/// Hashable, totally ordered form of a [`Value`]. Integers and doubles share
/// one numeric key so `10` and `10.0` collide, as they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum IndexKey {
    Null,
    Number(OrderedFloat),
    String(String),
    Object(Vec<(String, IndexKey)>),
    Array(Vec<IndexKey>),
    Bool(bool),
}

impl IndexKey {
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(n) => Self::Number(OrderedFloat::new(*n as f64)),
            Value::Float(f) => Self::Number(OrderedFloat::new(*f)),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from_value).collect()),
            Value::Object(doc) => Self::Object(
                doc.iter()
                    .map(|(k, v)| (k.to_string(), Self::from_value(v)))
                    .collect(),
            ),
        }
    }
}

/// Wrapper for f64 that implements Eq, Ord and Hash.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OrderedFloat(f64);

impl OrderedFloat {
    fn new(f: f64) -> Self {
        // -0.0 and 0.0 must be one key
        Self(if f == 0.0 { 0.0 } else { f })
    }
}

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

// =============================================================================
// Tests
// =============================================================================
