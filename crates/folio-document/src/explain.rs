//! Folio Explain
//!
//! Query plans and the explain report documents returned to callers.
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::QueryError;
use crate::query::SortSpec;
use crate::types::{Document, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Explain Mode
// =============================================================================

/// Verbosity of an explain report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExplainMode {
    /// Plan selection only.
    QueryPlanner,
    /// Plan selection plus statistics of the winning plan.
    #[default]
    ExecutionStats,
    /// Statistics for every candidate plan.
    AllPlansExecution,
}

impl ExplainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryPlanner => "queryPlanner",
            Self::ExecutionStats => "executionStats",
            Self::AllPlansExecution => "allPlansExecution",
        }
    }

    /// Whether the query must actually run to produce the report.
    pub fn executes(&self) -> bool {
        !matches!(self, Self::QueryPlanner)
    }
}

impl fmt::Display for ExplainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExplainMode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queryPlanner" => Ok(Self::QueryPlanner),
            "executionStats" => Ok(Self::ExecutionStats),
            "allPlansExecution" => Ok(Self::AllPlansExecution),
            other => Err(QueryError::InvalidExplainMode(other.to_string())),
        }
    }
}

// =============================================================================
// Explain Target
// =============================================================================

/// The operation being explained.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplainTarget {
    Find {
        filter: Document,
        sort: Option<SortSpec>,
    },
    Aggregate {
        pipeline: Vec<Document>,
    },
}

impl ExplainTarget {
    pub fn find(filter: Document) -> Self {
        Self::Find { filter, sort: None }
    }

    pub fn aggregate(pipeline: Vec<Document>) -> Self {
        Self::Aggregate { pipeline }
    }
}

// =============================================================================
// Query Plan
// =============================================================================

/// Access path chosen for a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    CollectionScan,
    IndexScan {
        index_name: String,
        key_pattern: Document,
        /// Equality values for the leading index fields.
        prefix: Vec<Value>,
    },
}

impl QueryPlan {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::CollectionScan => "COLLSCAN",
            Self::IndexScan { .. } => "IXSCAN",
        }
    }

    pub fn index_name(&self) -> Option<&str> {
        match self {
            Self::CollectionScan => None,
            Self::IndexScan { index_name, .. } => Some(index_name),
        }
    }

    /// Render as a plan tree. Index scans are wrapped in a FETCH stage and a
    /// requested sort becomes a SORT stage on top.
    pub fn to_document(&self, sort: Option<&SortSpec>) -> Document {
        let scan = match self {
            Self::CollectionScan => {
                let mut doc = Document::new();
                doc.set("stage", self.stage());
                doc.set("direction", "forward");
                doc
            }
            Self::IndexScan {
                index_name,
                key_pattern,
                ..
            } => {
                let mut ixscan = Document::new();
                ixscan.set("stage", self.stage());
                ixscan.set("keyPattern", key_pattern.clone());
                ixscan.set("indexName", index_name.clone());

                let mut fetch = Document::new();
                fetch.set("stage", "FETCH");
                fetch.set("inputStage", ixscan);
                fetch
            }
        };

        match sort {
            Some(sort) => {
                let mut doc = Document::new();
                doc.set("stage", "SORT");
                doc.set("sortPattern", sort.to_document());
                doc.set("inputStage", scan);
                doc
            }
            None => scan,
        }
    }
}

// =============================================================================
// Execution Statistics
// =============================================================================

/// Counters gathered while running an explained query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub n_returned: usize,
    pub total_docs_examined: usize,
    pub total_keys_examined: usize,
    pub execution_time_millis: u64,
}

impl ExecutionStats {
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.set("executionSuccess", true);
        doc.set("nReturned", self.n_returned);
        doc.set("executionTimeMillis", self.execution_time_millis);
        doc.set("totalKeysExamined", self.total_keys_examined);
        doc.set("totalDocsExamined", self.total_docs_examined);
        doc
    }
}

// =============================================================================
// Explain Report
// =============================================================================

/// Builder for the report document returned by `explain`.
pub struct ExplainReport<'a> {
    namespace: &'a str,
    mode: ExplainMode,
    plan: &'a QueryPlan,
    parsed_query: Option<&'a Document>,
    sort: Option<&'a SortSpec>,
    stages: Vec<String>,
    stats: Option<ExecutionStats>,
}

impl<'a> ExplainReport<'a> {
    pub fn new(namespace: &'a str, mode: ExplainMode, plan: &'a QueryPlan) -> Self {
        Self {
            namespace,
            mode,
            plan,
            parsed_query: None,
            sort: None,
            stages: Vec::new(),
            stats: None,
        }
    }

    pub fn with_query(mut self, filter: &'a Document) -> Self {
        self.parsed_query = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Option<&'a SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Attach statistics; ignored in `queryPlanner` mode.
    pub fn with_stats(mut self, stats: ExecutionStats) -> Self {
        if self.mode.executes() {
            self.stats = Some(stats);
        }
        self
    }

    pub fn build(self) -> Document {
        let mut planner = Document::new();
        planner.set("namespace", self.namespace);
        if let Some(filter) = self.parsed_query {
            planner.set("parsedQuery", filter.clone());
        }
        planner.set("winningPlan", self.plan.to_document(self.sort));
        planner.set("rejectedPlans", Vec::<Value>::new());

        let mut report = Document::new();
        report.set("explainVersion", "1");
        if !self.stages.is_empty() {
            let stages: Vec<Value> = self.stages.into_iter().map(Value::from).collect();
            report.set("stages", stages);
        }
        report.set("queryPlanner", planner);

        if let Some(stats) = self.stats {
            let mut execution = stats.to_document();
            if self.mode == ExplainMode::AllPlansExecution {
                // a single candidate plan is ever generated
                execution.set("allPlansExecution", Vec::<Value>::new());
            }
            report.set("executionStats", execution);
        }

        report.set("verbosity", self.mode.as_str());
        report.set("ok", 1);
        report
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn index_plan() -> QueryPlan {
        QueryPlan::IndexScan {
            index_name: "title_1".to_string(),
            key_pattern: doc! { "title": 1 },
            prefix: vec![Value::from("Dune")],
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "executionStats".parse::<ExplainMode>().unwrap(),
            ExplainMode::ExecutionStats
        );
        assert_eq!(
            "queryPlanner".parse::<ExplainMode>().unwrap(),
            ExplainMode::QueryPlanner
        );
        assert!(matches!(
            "verbose".parse::<ExplainMode>(),
            Err(QueryError::InvalidExplainMode(_))
        ));
        assert_eq!(ExplainMode::default(), ExplainMode::ExecutionStats);
        assert_eq!(
            serde_json::to_string(&ExplainMode::AllPlansExecution).unwrap(),
            "\"allPlansExecution\""
        );
    }

    #[test]
    fn test_plan_tree() {
        let plan = index_plan();
        let tree = plan.to_document(None);
        assert_eq!(tree.get("stage"), Some(&Value::from("FETCH")));
        assert_eq!(tree.get("inputStage.stage"), Some(&Value::from("IXSCAN")));
        assert_eq!(tree.get("inputStage.indexName"), Some(&Value::from("title_1")));

        let sort = SortSpec::parse(&doc! { "published_year": -1 }).unwrap();
        let tree = QueryPlan::CollectionScan.to_document(Some(&sort));
        assert_eq!(tree.get("stage"), Some(&Value::from("SORT")));
        assert_eq!(tree.get("inputStage.stage"), Some(&Value::from("COLLSCAN")));
    }

    #[test]
    fn test_report_modes() {
        let plan = index_plan();
        let filter = doc! { "title": "Dune" };
        let stats = ExecutionStats {
            n_returned: 1,
            total_docs_examined: 1,
            total_keys_examined: 1,
            execution_time_millis: 0,
        };

        let report = ExplainReport::new("books", ExplainMode::QueryPlanner, &plan)
            .with_query(&filter)
            .with_stats(stats)
            .build();
        assert!(report.get("executionStats").is_none());
        assert_eq!(
            report.get("queryPlanner.namespace"),
            Some(&Value::from("books"))
        );

        let report = ExplainReport::new("books", ExplainMode::ExecutionStats, &plan)
            .with_query(&filter)
            .with_stats(stats)
            .build();
        assert_eq!(report.get("executionStats.nReturned"), Some(&Value::Int(1)));
        assert!(report.get("executionStats.allPlansExecution").is_none());

        let report = ExplainReport::new("books", ExplainMode::AllPlansExecution, &plan)
            .with_stats(stats)
            .build();
        assert!(report.get("executionStats.allPlansExecution").is_some());
    }

    #[test]
    fn test_report_stages() {
        let plan = QueryPlan::CollectionScan;
        let report = ExplainReport::new("books", ExplainMode::QueryPlanner, &plan)
            .with_stages(vec!["$group".to_string(), "$sort".to_string()])
            .build();
        assert_eq!(
            report.get("stages"),
            Some(&Value::Array(vec![Value::from("$group"), Value::from("$sort")]))
        );
    }
}
