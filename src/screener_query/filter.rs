use serde::{Deserialize, Serialize};

use super::expression::Expression;

/// Filter tree over expressions. Composite nodes nest arbitrarily; `not` is
/// expected to carry exactly one child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Composite(CompositeFilter),
    Simple(SimpleFilter),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleFilter {
    pub target: Expression,
    pub op: FilterOp,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeFilter {
    pub operator: LogicalOperator,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    pub fn sql(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Not => "NOT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Contains,
    Ncontains,
}

impl FilterOp {
    pub fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Neq => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::In => "IN",
            FilterOp::Nin => "NOT IN",
            FilterOp::Contains => "LIKE",
            FilterOp::Ncontains => "NOT LIKE",
        }
    }

    /// LIKE-family operators wrap their string value as `%value%` when the
    /// parameter is created.
    pub fn is_like(&self) -> bool {
        matches!(self, FilterOp::Contains | FilterOp::Ncontains)
    }
}

impl Filter {
    /// Structural equality: simple filters match on operator plus equal
    /// target/value; composites match on operator plus pointwise equal
    /// children.
    pub fn structurally_equal(&self, other: &Filter) -> bool {
        match (self, other) {
            (Filter::Simple(a), Filter::Simple(b)) => {
                a.op == b.op
                    && a.target.structurally_equal(&b.target)
                    && a.value.structurally_equal(&b.value)
            }
            (Filter::Composite(a), Filter::Composite(b)) => {
                a.operator == b.operator
                    && a.filters.len() == b.filters.len()
                    && a.filters
                        .iter()
                        .zip(b.filters.iter())
                        .all(|(x, y)| x.structurally_equal(y))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_filter_deserialization() {
        let simple: Filter = serde_json::from_str(
            r#"{"target": {"metric": "sector"}, "op": "eq", "value": "Technology"}"#,
        )
        .unwrap();
        assert!(matches!(simple, Filter::Simple(_)));

        let composite: Filter = serde_json::from_str(
            r#"{"operator": "and", "filters": [
                {"target": {"metric": "sector"}, "op": "eq", "value": "Technology"},
                {"target": {"metric": "volume"}, "op": "gt", "value": 1000000}
            ]}"#,
        )
        .unwrap();
        match composite {
            Filter::Composite(c) => {
                assert_eq!(c.operator, LogicalOperator::And);
                assert_eq!(c.filters.len(), 2);
            }
            other => panic!("expected composite, got {:?}", other),
        }
    }

    #[test]
    fn test_op_sql_mapping() {
        assert_eq!(FilterOp::Nin.sql(), "NOT IN");
        assert_eq!(FilterOp::Ncontains.sql(), "NOT LIKE");
        assert!(FilterOp::Contains.is_like());
        assert!(!FilterOp::In.is_like());
    }
}
