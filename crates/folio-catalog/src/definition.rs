//! Folio Query Definitions
//!
//! A named, immutable description of one store operation together with the
//! rules for which fields each kind of operation accepts.
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::{CatalogError, CatalogResult};
use folio_document::{Document, ExplainMode, IndexSpec, Projection, SortSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Query Kind
// =============================================================================

/// The store operation a definition runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryKind {
    Find,
    UpdateOne,
    DeleteOne,
    Aggregate,
    CreateIndex,
    ListIndexes,
    Explain,
}

impl QueryKind {
    pub const ALL: [QueryKind; 7] = [
        Self::Find,
        Self::UpdateOne,
        Self::DeleteOne,
        Self::Aggregate,
        Self::CreateIndex,
        Self::ListIndexes,
        Self::Explain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::UpdateOne => "updateOne",
            Self::DeleteOne => "deleteOne",
            Self::Aggregate => "aggregate",
            Self::CreateIndex => "createIndex",
            Self::ListIndexes => "listIndexes",
            Self::Explain => "explain",
        }
    }

    /// Whether executing this kind changes the store.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::UpdateOne | Self::DeleteOne | Self::CreateIndex)
    }

    /// Fields a definition of this kind may carry.
    fn allowed(&self) -> &'static [Field] {
        match self {
            Self::Find => &[
                Field::Filter,
                Field::Projection,
                Field::Sort,
                Field::Limit,
                Field::Skip,
            ],
            Self::UpdateOne => &[Field::Filter, Field::Update],
            Self::DeleteOne => &[Field::Filter],
            Self::Aggregate => &[Field::Pipeline],
            Self::CreateIndex => &[Field::IndexSpec],
            Self::ListIndexes => &[],
            Self::Explain => &[
                Field::Filter,
                Field::Sort,
                Field::Pipeline,
                Field::ExplainMode,
            ],
        }
    }

    /// Fields a definition of this kind must carry.
    fn required(&self) -> &'static [Field] {
        match self {
            Self::UpdateOne => &[Field::Filter, Field::Update],
            Self::DeleteOne => &[Field::Filter],
            Self::Aggregate => &[Field::Pipeline],
            Self::CreateIndex => &[Field::IndexSpec],
            Self::Find | Self::ListIndexes | Self::Explain => &[],
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Filter,
    Projection,
    Sort,
    Limit,
    Skip,
    Pipeline,
    Update,
    IndexSpec,
    ExplainMode,
}

impl Field {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Projection => "projection",
            Self::Sort => "sort",
            Self::Limit => "limit",
            Self::Skip => "skip",
            Self::Pipeline => "pipeline",
            Self::Update => "update",
            Self::IndexSpec => "index_spec",
            Self::ExplainMode => "explain_mode",
        }
    }
}

// =============================================================================
// Query Definition
// =============================================================================

/// A named query: the operation kind plus the documents it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDefinition")]
pub struct QueryDefinition {
    pub name: String,
    pub kind: QueryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<Document>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_spec: Option<IndexSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain_mode: Option<ExplainMode>,
}

impl QueryDefinition {
    /// An empty definition of the given kind.
    pub fn new(name: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            filter: None,
            projection: None,
            sort: None,
            limit: None,
            skip: None,
            pipeline: None,
            update: None,
            index_spec: None,
            explain_mode: None,
        }
    }

    pub fn find(name: impl Into<String>) -> Self {
        Self::new(name, QueryKind::Find)
    }

    pub fn update_one(name: impl Into<String>, filter: Document, update: Document) -> Self {
        Self::new(name, QueryKind::UpdateOne)
            .with_filter(filter)
            .with_update(update)
    }

    pub fn delete_one(name: impl Into<String>, filter: Document) -> Self {
        Self::new(name, QueryKind::DeleteOne).with_filter(filter)
    }

    pub fn aggregate(name: impl Into<String>, pipeline: Vec<Document>) -> Self {
        Self::new(name, QueryKind::Aggregate).with_pipeline(pipeline)
    }

    pub fn create_index(name: impl Into<String>, spec: IndexSpec) -> Self {
        Self::new(name, QueryKind::CreateIndex).with_index_spec(spec)
    }

    pub fn list_indexes(name: impl Into<String>) -> Self {
        Self::new(name, QueryKind::ListIndexes)
    }

    /// Explain a find with the given filter.
    pub fn explain(name: impl Into<String>, filter: Document) -> Self {
        Self::new(name, QueryKind::Explain).with_filter(filter)
    }

    /// Explain an aggregation pipeline.
    pub fn explain_pipeline(name: impl Into<String>, pipeline: Vec<Document>) -> Self {
        Self::new(name, QueryKind::Explain).with_pipeline(pipeline)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Vec<Document>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_update(mut self, update: Document) -> Self {
        self.update = Some(update);
        self
    }

    pub fn with_index_spec(mut self, spec: IndexSpec) -> Self {
        self.index_spec = Some(spec);
        self
    }

    pub fn with_explain_mode(mut self, mode: ExplainMode) -> Self {
        self.explain_mode = Some(mode);
        self
    }

    fn present(&self) -> Vec<Field> {
        let flags = [
            (Field::Filter, self.filter.is_some()),
            (Field::Projection, self.projection.is_some()),
            (Field::Sort, self.sort.is_some()),
            (Field::Limit, self.limit.is_some()),
            (Field::Skip, self.skip.is_some()),
            (Field::Pipeline, self.pipeline.is_some()),
            (Field::Update, self.update.is_some()),
            (Field::IndexSpec, self.index_spec.is_some()),
            (Field::ExplainMode, self.explain_mode.is_some()),
        ];
        flags
            .into_iter()
            .filter_map(|(field, set)| set.then_some(field))
            .collect()
    }

    /// Check that the fields present match the kind.
    pub fn validate(&self) -> CatalogResult<()> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::validation(
                &self.name,
                "name must not be empty",
            ));
        }

        let present = self.present();
        let fail = |reason: String| Err(CatalogError::validation(&self.name, reason));

        for field in &present {
            if !self.kind.allowed().contains(field) {
                return fail(format!(
                    "{} is not allowed for {}",
                    field.as_str(),
                    self.kind
                ));
            }
        }
        for field in self.kind.required() {
            if !present.contains(field) {
                return fail(format!("{} requires {}", self.kind, field.as_str()));
            }
        }

        if self.kind == QueryKind::Explain {
            match (&self.filter, &self.pipeline) {
                (None, None) => return fail("explain requires a filter or a pipeline".to_string()),
                (Some(_), Some(_)) => {
                    return fail("explain takes a filter or a pipeline, not both".to_string())
                }
                (None, Some(_)) if self.sort.is_some() => {
                    return fail("sort is only allowed when explaining a filter".to_string())
                }
                _ => {}
            }
        }

        if let Some(update) = &self.update {
            if update.is_empty() {
                return fail("update must not be empty".to_string());
            }
            if let Some(key) = update.keys().find(|k| !k.starts_with('$')) {
                return fail(format!("update key '{}' is not an operator", key));
            }
        }

        if let Some(pipeline) = &self.pipeline {
            for (i, stage) in pipeline.iter().enumerate() {
                let operator = stage.first().map(|(k, _)| k).filter(|k| k.starts_with('$'));
                if stage.len() != 1 || operator.is_none() {
                    return fail(format!(
                        "pipeline stage {} must be a single-key $-document",
                        i
                    ));
                }
            }
        }

        if let Some(spec) = &self.index_spec {
            if spec.keys().is_empty() {
                return fail("index_spec must name at least one field".to_string());
            }
        }

        if let Some(projection) = &self.projection {
            Projection::parse(projection).map_err(|e| {
                CatalogError::validation(&self.name, e.to_string())
            })?;
        }

        Ok(())
    }
}

// =============================================================================
// Serialized Form
// =============================================================================

/// Wire form with the kind as a plain string, so unknown kinds surface as
/// [`CatalogError::UnknownKind`].
#[derive(Deserialize)]
pub(crate) struct RawDefinition {
    name: String,
    kind: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    filter: Option<Document>,
    #[serde(default)]
    projection: Option<Document>,
    #[serde(default)]
    sort: Option<SortSpec>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    skip: Option<usize>,
    #[serde(default)]
    pipeline: Option<Vec<Document>>,
    #[serde(default)]
    update: Option<Document>,
    #[serde(default)]
    index_spec: Option<IndexSpec>,
    #[serde(default)]
    explain_mode: Option<ExplainMode>,
}

impl TryFrom<RawDefinition> for QueryDefinition {
    type Error = CatalogError;

    fn try_from(raw: RawDefinition) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: raw.kind.parse()?,
            name: raw.name,
            description: raw.description,
            filter: raw.filter,
            projection: raw.projection,
            sort: raw.sort,
            limit: raw.limit,
            skip: raw.skip,
            pipeline: raw.pipeline,
            update: raw.update,
            index_spec: raw.index_spec,
            explain_mode: raw.explain_mode,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
