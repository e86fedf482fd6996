//! Expression model for screener queries.
//!
//! Expressions are a recursive sum type: a constant literal, a metric
//! reference resolved through the screener config, a math expression over
//! operand expressions, or an aggregate over a target expression with an
//! optional time window.
//!
//! Structural equality intentionally differs from `PartialEq`: two
//! aggregates are structurally equal when their time ranges are merely the
//! same variant, so the optimizer can collapse windows that land in the
//! same SQL scope.

use serde::{Deserialize, Serialize};

use super::filter::Filter;
use super::time_range::TimeRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expression {
    Aggregate(Box<AggregateExpression>),
    Math(MathExpression),
    Metric(MetricExpression),
    Constant(ConstantValue),
}

/// Literal operand. List elements must share a type; the parameter table
/// rejects mixed-type arrays when the placeholder is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstantValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<serde_json::Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricExpression {
    pub metric: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Box<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathExpression {
    pub operator: MathOperator,
    pub operands: Vec<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpression {
    pub target: Expression,
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<AggregateParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Extra knobs for parameterized aggregations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AggregateParams {
    /// Quantile level for `percentile` (default 0.5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
    /// Smoothing span for `ema` (default 10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Pow,
    Mod,
    Sqrt,
    Abs,
    Ln,
    Log10,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl MathOperator {
    /// True for operators emitted as `fn(arg, ...)` instead of infix.
    pub fn is_function(&self) -> bool {
        matches!(
            self,
            MathOperator::Pow
                | MathOperator::Sqrt
                | MathOperator::Abs
                | MathOperator::Ln
                | MathOperator::Log10
        )
    }

    pub fn sql(&self) -> &'static str {
        match self {
            MathOperator::Add => "+",
            MathOperator::Subtract => "-",
            MathOperator::Multiply => "*",
            MathOperator::Divide => "/",
            MathOperator::Mod => "%",
            MathOperator::Pow => "pow",
            MathOperator::Sqrt => "sqrt",
            MathOperator::Abs => "abs",
            MathOperator::Ln => "ln",
            MathOperator::Log10 => "log10",
            MathOperator::Eq => "=",
            MathOperator::Neq => "!=",
            MathOperator::Gt => ">",
            MathOperator::Gte => ">=",
            MathOperator::Lt => "<",
            MathOperator::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    First,
    Last,
    Min,
    Max,
    Median,
    Percentile,
    Avg,
    Sum,
    Stddev,
    Count,
    Variance,
    Diff,
    DiffPct,
    Ema,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::First => "first",
            Aggregation::Last => "last",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Median => "median",
            Aggregation::Percentile => "percentile",
            Aggregation::Avg => "avg",
            Aggregation::Sum => "sum",
            Aggregation::Stddev => "stddev",
            Aggregation::Count => "count",
            Aggregation::Variance => "variance",
            Aggregation::Diff => "diff",
            Aggregation::DiffPct => "diff_pct",
            Aggregation::Ema => "ema",
        }
    }
}

impl Expression {
    /// User-supplied alias, if the variant carries one.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Expression::Aggregate(agg) => agg.alias.as_deref(),
            Expression::Math(math) => math.alias.as_deref(),
            Expression::Metric(metric) => metric.alias.as_deref(),
            Expression::Constant(_) => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant(_))
    }

    /// Structural equality per the deduplication rules: same variant, same
    /// alias, and variant-specific comparison. Aggregate time ranges compare
    /// by variant only.
    pub fn structurally_equal(&self, other: &Expression) -> bool {
        if self.alias() != other.alias() {
            return false;
        }
        match (self, other) {
            (Expression::Constant(a), Expression::Constant(b)) => a == b,
            (Expression::Metric(a), Expression::Metric(b)) => a.metric == b.metric,
            (Expression::Math(a), Expression::Math(b)) => {
                a.operator == b.operator
                    && a.operands.len() == b.operands.len()
                    && a.operands
                        .iter()
                        .zip(b.operands.iter())
                        .all(|(x, y)| x.structurally_equal(y))
            }
            (Expression::Aggregate(a), Expression::Aggregate(b)) => {
                if a.aggregation != b.aggregation {
                    return false;
                }
                let ranges_match = match (&a.time_range, &b.time_range) {
                    (None, None) => true,
                    (Some(x), Some(y)) => x.same_kind(y),
                    _ => false,
                };
                let filters_match = match (&a.filter, &b.filter) {
                    (None, None) => true,
                    (Some(x), Some(y)) => x.structurally_equal(y),
                    _ => false,
                };
                ranges_match && filters_match && a.target.structurally_equal(&b.target)
            }
            _ => false,
        }
    }
}
