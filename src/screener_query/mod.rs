//! Declarative screener query model.
//!
//! A [`UserQuery`] is the validated JSON input to the compiler: a filter
//! tree over metric/math/aggregate expressions, optional grouping (plain
//! dimensions or top-N-per-group), sorting, and a row limit. The compiler
//! never executes these queries; it lowers them into the compute graph and
//! emits ClickHouse SQL.

use serde::{Deserialize, Serialize};

pub mod expression;
pub mod filter;
pub mod time_range;
pub mod validation;

pub use expression::{
    AggregateExpression, AggregateParams, Aggregation, ConstantValue, Expression, MathExpression,
    MathOperator, MetricExpression,
};
pub use filter::{CompositeFilter, Filter, FilterOp, LogicalOperator, SimpleFilter};
pub use time_range::{TimeRange, TimeUnit};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserQuery {
    pub id: String,
    pub name: String,
    pub status: QueryStatus,
    pub filter: Filter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<GroupingCriterion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<Vec<SortSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    // Pass-through metadata; not interpreted by the compiler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Active,
    Running,
    Completed,
    Failed,
    Stopped,
}

/// A grouping criterion: either a bare dimension name, or top-N-per-group
/// with an optional ordering expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupingCriterion {
    TopN(TopNGrouping),
    Dimension(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopNGrouping {
    pub dimension: String,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub target: Expression,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}
