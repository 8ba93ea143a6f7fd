//! Folio Document Types
//!
//! Core data types for document storage. Documents are ordered field maps,
//! so specifications such as `{author: 1, published_year: -1}` keep the
//! order they were written in.
//!
//! @version 0.1.0
//! @author Folio Development Team

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Document ID
// =============================================================================

/// Generated identifier assigned to documents inserted without an `_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate an id unique within this process.
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:016x}{:08x}", nanos, counter & 0xffff_ffff))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        Self::String(id.0)
    }
}

// =============================================================================
// Value
// =============================================================================

/// A document value that can be any JSON-compatible type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Document),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view; floats only convert when they have no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Object(doc) => Some(doc),
            _ => None,
        }
    }

    /// Name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "double",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Position of the value's type in cross-type ordering.
    pub fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Int(_) | Self::Float(_) => 1,
            Self::String(_) => 2,
            Self::Object(_) => 3,
            Self::Array(_) => 4,
            Self::Bool(_) => 5,
        }
    }

    /// Get a value at a path (e.g., "user.address.city").
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        self.get_path_parts(&parts)
    }

    fn get_path_parts(&self, parts: &[&str]) -> Option<&Value> {
        if parts.is_empty() {
            return Some(self);
        }

        let key = parts[0];
        let rest = &parts[1..];

        match self {
            Self::Object(doc) => doc.field(key).and_then(|v| v.get_path_parts(rest)),
            Self::Array(arr) => key
                .parse::<usize>()
                .ok()
                .and_then(|idx| arr.get(idx))
                .and_then(|v| v.get_path_parts(rest)),
            _ => None,
        }
    }

    /// Convert to serde_json::Value.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(n) => JsonValue::Number((*n).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
            Self::Object(doc) => doc.to_json(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        i64::try_from(n).map(Self::Int).unwrap_or(Self::Float(n as f64))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::from(n as u64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(arr: Vec<Value>) -> Self {
        Self::Array(arr)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Self::Object(doc)
    }
}

// =============================================================================
// Document
// =============================================================================

/// An ordered mapping from field names to values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// The document's `_id`, if it has one.
    pub fn id(&self) -> Option<&Value> {
        self.field("_id")
    }

    /// Top-level field lookup without path splitting.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a field value; dotted keys walk into nested documents and arrays.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match key.split_once('.') {
            Some((head, rest)) if self.field(key).is_none() => {
                self.field(head).and_then(|v| v.get_path(rest))
            }
            _ => self.field(key),
        }
    }

    /// Set a top-level field, keeping its position if it already exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.field_mut(&key) {
            Some(slot) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Set a value at a dotted path, creating intermediate documents.
    ///
    /// Returns false when an intermediate value exists and is not a document.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> bool {
        match path.split_once('.') {
            None => {
                self.set(path, value);
                true
            }
            Some((head, rest)) => {
                if self.field(head).is_none() {
                    self.set(head, Document::new());
                }
                match self.field_mut(head) {
                    Some(Value::Object(inner)) => inner.set_path(rest, value),
                    _ => false,
                }
            }
        }
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(pos).1)
    }

    /// Remove a value at a dotted path.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        match path.split_once('.') {
            None => self.remove(path),
            Some((head, rest)) => match self.field_mut(head) {
                Some(Value::Object(inner)) => inner.remove_path(rest),
                _ => None,
            },
        }
    }

    /// Check if a field exists.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The first field, used to read single-key stage documents.
    pub fn first(&self) -> Option<(&str, &Value)> {
        self.fields.first().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.to_json());
        }
        JsonValue::Object(obj)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.set(k, v);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = Document;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a document object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Document, A::Error> {
                let mut doc = Document::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    doc.set(key, value);
                }
                Ok(doc)
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Build an ordered [`Document`] from `"key": value` pairs.
///
/// ```ignore
/// let spec = doc! { "author": 1, "published_year": -1 };
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($key:literal : $value:expr),+ $(,)?) => {{
        let mut doc = $crate::Document::new();
        $( doc.set($key, $value); )+
        doc
    }};
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id() {
        let id1 = DocumentId::generate();
        let id2 = DocumentId::generate();
        assert_ne!(id1, id2);

        let id3 = DocumentId::new("custom-id");
        assert_eq!(id3.as_str(), "custom-id");
    }

    #[test]
    fn test_value_types() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_i64(), Some(42));
        assert_eq!(Value::Float(4.0).as_i64(), Some(4));
        assert_eq!(Value::Float(4.5).as_i64(), None);
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert!(Value::Float(1.5).is_number());
    }

    #[test]
    fn test_field_order_preserved() {
        let doc = doc! { "author": 1, "published_year": -1, "title": 1 };
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["author", "published_year", "title"]);

        let mut doc = doc;
        doc.set("author", -1);
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["author", "published_year", "title"]);
        assert_eq!(doc.get("author"), Some(&Value::Int(-1)));
    }

    #[test]
    fn test_nested_paths() {
        let mut doc = doc! {
            "address": doc! { "city": "NYC" },
            "tags": vec![Value::from("a"), Value::from("b")],
        };

        assert_eq!(doc.get("address.city").and_then(|v| v.as_str()), Some("NYC"));
        assert_eq!(doc.get("tags.1").and_then(|v| v.as_str()), Some("b"));
        assert!(doc.get("address.zip").is_none());

        assert!(doc.set_path("address.zip", "10001"));
        assert!(doc.set_path("meta.edition.number", 2));
        assert_eq!(doc.get("meta.edition.number"), Some(&Value::Int(2)));
        assert!(!doc.set_path("tags.0.name", "x"));

        assert_eq!(doc.remove_path("address.city"), Some(Value::from("NYC")));
        assert!(!doc.contains("address.city"));
    }

    #[test]
    fn test_document_from_json() {
        let json = serde_json::json!({
            "_id": "doc123",
            "title": "Emma",
            "in_stock": true,
            "price": 9.5
        });

        let doc: Document = serde_json::from_value(json).unwrap();
        assert_eq!(doc.id(), Some(&Value::from("doc123")));
        assert_eq!(doc.get("title").and_then(|v| v.as_str()), Some("Emma"));
        assert_eq!(doc.get("price").and_then(|v| v.as_f64()), Some(9.5));
        assert!(serde_json::from_value::<Document>(serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn test_serde_keeps_order() {
        let text = r#"{"zeta": 1, "alpha": {"b": 2, "a": 1.5}, "mid": [null, "x"]}"#;
        let doc: Document = serde_json::from_str(text).unwrap();
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);

        let inner = doc.get("alpha").and_then(|v| v.as_document()).unwrap();
        assert_eq!(inner.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(inner.get("a"), Some(&Value::Float(1.5)));

        let out = serde_json::to_string(&doc).unwrap();
        assert_eq!(out, r#"{"zeta":1,"alpha":{"b":2,"a":1.5},"mid":[null,"x"]}"#);
    }

    #[test]
    fn test_json_conversion() {
        let doc = doc! { "count": 100, "ratio": 0.5 };
        let json = doc.to_json();
        assert_eq!(json["count"], 100);
        assert_eq!(json["ratio"], 0.5);
    }

    #[test]
    fn test_json_value_conversion_keeps_order() {
        let doc = doc! { "title": 1, "price": 1, "author": doc! { "last": "Weir", "first": "Andy" } };
        let json = doc.to_json();
        assert_eq!(
            json.to_string(),
            r#"{"title":1,"price":1,"author":{"last":"Weir","first":"Andy"}}"#
        );

        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["title", "price", "author"]);
    }
}
