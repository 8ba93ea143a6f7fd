//! Folio Document Validation
//!
//! Field-level schemas checked on insert and after every update.
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::QueryError;
use crate::query::values_equal;
use crate::types::{Document, Value};
use regex::Regex;

// =============================================================================
// Schema
// =============================================================================

/// Schema definition for document validation. Fields are checked in the
/// order they were declared so error lists are stable.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<SchemaField>,
    additional_properties: bool,
}

#[derive(Debug, Clone)]
struct SchemaField {
    name: String,
    schema: FieldSchema,
    required: bool,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            additional_properties: true,
        }
    }

    /// Declare an optional field.
    pub fn field(self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.push(name.into(), schema, false)
    }

    /// Declare a field that must be present.
    pub fn required(self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.push(name.into(), schema, true)
    }

    fn push(mut self, name: String, schema: FieldSchema, required: bool) -> Self {
        self.fields.retain(|f| f.name != name);
        self.fields.push(SchemaField {
            name,
            schema,
            required,
        });
        self
    }

    /// Reject fields the schema does not declare. `_id` is always allowed.
    pub fn additional_properties(mut self, allow: bool) -> Self {
        self.additional_properties = allow;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate a document, collecting every violation.
    pub fn validate(&self, doc: &Document) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for field in &self.fields {
            match doc.get(&field.name) {
                Some(value) => {
                    if let Err(err) = field.schema.validate(value) {
                        errors.push(format!("field '{}': {}", field.name, err));
                    }
                }
                None if field.required => {
                    errors.push(format!("missing required field '{}'", field.name));
                }
                None => {}
            }
        }

        if !self.additional_properties {
            for key in doc.keys() {
                if key != "_id" && !self.fields.iter().any(|f| f.name == key) {
                    errors.push(format!("unknown field '{}'", key));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// =============================================================================
// Field Schema
// =============================================================================

/// Constraints for a single field.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    field_type: FieldType,
    nullable: bool,
    min: Option<f64>,
    max: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    enum_values: Option<Vec<Value>>,
    items: Option<Box<FieldSchema>>,
}

impl FieldSchema {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: false,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            pattern: None,
            enum_values: None,
            items: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn int() -> Self {
        Self::new(FieldType::Int)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn bool() -> Self {
        Self::new(FieldType::Bool)
    }

    pub fn array(items: FieldSchema) -> Self {
        let mut schema = Self::new(FieldType::Array);
        schema.items = Some(Box::new(items));
        schema
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Minimum length in characters for strings, elements for arrays.
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Require strings to match `pattern`. The pattern is compiled once here.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, QueryError> {
        let re = regex::RegexBuilder::new(pattern)
            .size_limit(1024 * 1024)
            .build()
            .map_err(|e| QueryError::InvalidRegex(e.to_string()))?;
        self.pattern = Some(re);
        Ok(self)
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            return if self.nullable {
                Ok(())
            } else {
                Err("value cannot be null".to_string())
            };
        }

        if !self.field_type.matches(value) {
            return Err(format!(
                "expected {}, got {}",
                self.field_type.as_str(),
                value.type_name()
            ));
        }

        if let Some(allowed) = &self.enum_values {
            if !allowed.iter().any(|v| values_equal(v, value)) {
                return Err(format!("{} is not an allowed value", value));
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.min.filter(|min| n < *min) {
                return Err(format!("{} is less than minimum {}", value, min));
            }
            if let Some(max) = self.max.filter(|max| n > *max) {
                return Err(format!("{} is greater than maximum {}", value, max));
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = length {
            if let Some(min) = self.min_length.filter(|min| len < *min) {
                return Err(format!("length {} is less than minimum {}", len, min));
            }
            if let Some(max) = self.max_length.filter(|max| len > *max) {
                return Err(format!("length {} is greater than maximum {}", len, max));
            }
        }

        if let (Some(re), Value::String(s)) = (&self.pattern, value) {
            if !re.is_match(s) {
                return Err(format!("'{}' does not match pattern {}", s, re.as_str()));
            }
        }

        if let (Some(item_schema), Value::Array(items)) = (&self.items, value) {
            for (i, item) in items.iter().enumerate() {
                item_schema
                    .validate(item)
                    .map_err(|e| format!("item {}: {}", i, e))?;
            }
        }

        Ok(())
    }
}

// =============================================================================
// Field Type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int,
    Float,
    Number,
    Bool,
    Array,
    Object,
    Any,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Any, _)
                | (Self::String, Value::String(_))
                | (Self::Int, Value::Int(_))
                | (Self::Float, Value::Float(_))
                | (Self::Number, Value::Int(_) | Value::Float(_))
                | (Self::Bool, Value::Bool(_))
                | (Self::Array, Value::Array(_))
                | (Self::Object, Value::Object(_))
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "double",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
