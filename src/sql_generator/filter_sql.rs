//! Filter → SQL predicate translation and WHERE/QUALIFY classification.

use std::collections::HashSet;

use crate::compute_graph::{FilterOperand, NodeKind};
use crate::screener_query::{Expression, FilterOp, LogicalOperator};

use super::errors::SqlError;
use super::SqlGenerator;

/// Window-function tokens that force a predicate into QUALIFY even when no
/// scope alias is referenced.
const WINDOW_TOKENS: &[&str] = &[
    "last_value(",
    "first_value(",
    "avg(",
    "sum(",
    "min(",
    "max(",
    "count(",
];

#[derive(Debug, Clone, Default)]
pub struct FilterFragment {
    pub sql: String,
    pub touches_window: bool,
}

impl SqlGenerator<'_> {
    /// Translate a filter or composite-filter node into one predicate
    /// string, reporting whether it must be placed in QUALIFY.
    pub(super) fn translate_filter_tree(
        &mut self,
        id: &str,
        window_aliases: &HashSet<String>,
    ) -> Result<FilterFragment, SqlError> {
        let Some(node) = self.graph.node(id) else {
            return Ok(FilterFragment::default());
        };
        match &node.kind {
            NodeKind::CompositeFilter(composite) => {
                let operator = composite.operator;
                let children = node.inputs.clone();
                let mut parts = Vec::new();
                let mut touches_window = false;
                for child in &children {
                    let fragment = self.translate_filter_tree(child, window_aliases)?;
                    if fragment.sql.is_empty() {
                        continue;
                    }
                    touches_window |= fragment.touches_window;
                    parts.push(fragment.sql);
                }
                if parts.is_empty() {
                    return Ok(FilterFragment::default());
                }
                let sql = match operator {
                    LogicalOperator::Not => format!("NOT ({})", parts.join(" AND ")),
                    LogicalOperator::And | LogicalOperator::Or if parts.len() == 1 => {
                        parts.remove(0)
                    }
                    LogicalOperator::And => format!("({})", parts.join(" AND ")),
                    LogicalOperator::Or => format!("({})", parts.join(" OR ")),
                };
                Ok(FilterFragment {
                    sql,
                    touches_window,
                })
            }
            NodeKind::Filter(filter) => {
                let condition = filter.condition.clone();
                let (left_sql, left_alias) = self.filter_side(&condition.left, condition.op)?;
                let (right_sql, right_alias) = self.filter_side(&condition.right, condition.op)?;
                let sql = format!("{} {} {}", left_sql, condition.op.sql(), right_sql);

                let references_window_alias = [left_alias, right_alias]
                    .into_iter()
                    .flatten()
                    .any(|alias| window_aliases.contains(&alias));
                let contains_window_fn = WINDOW_TOKENS.iter().any(|token| sql.contains(token));
                Ok(FilterFragment {
                    sql,
                    touches_window: references_window_alias || contains_window_fn,
                })
            }
            _ => Ok(FilterFragment::default()),
        }
    }

    /// One side of a simple filter: the rendered SQL plus the alias it
    /// resolves to, when it names a node.
    fn filter_side(
        &mut self,
        operand: &FilterOperand,
        op: FilterOp,
    ) -> Result<(String, Option<String>), SqlError> {
        match operand {
            FilterOperand::NodeRef { input, metric } => {
                let resolved = metric.clone().or_else(|| self.node_output(input));
                let sql = resolved.clone().unwrap_or_else(|| input.clone());
                Ok((sql, resolved))
            }
            FilterOperand::Parameter { parameter } => Ok((parameter.clone(), None)),
            FilterOperand::Literal(expr) => match expr {
                Expression::Constant(value) => {
                    Ok((self.params.create_parameter(value, Some(op))?, None))
                }
                other => {
                    let fragment = self.translate_operand(other, &[])?;
                    Ok((fragment.column, None))
                }
            },
        }
    }

    /// The name a node answers to in the current SQL scope: its registered
    /// output if already emitted, else its alias or projected column.
    pub(super) fn node_output(&self, id: &str) -> Option<String> {
        if let Some(output) = self.node_outputs.get(id) {
            return Some(output.clone());
        }
        let node = self.graph.node(id)?;
        match &node.kind {
            NodeKind::Expression(expr) => expr.alias.clone().or_else(|| expr.rendered.clone()),
            NodeKind::Projection(projection) => projection
                .columns
                .first()
                .and_then(|c| c.output_name().map(str::to_string)),
            _ => None,
        }
    }
}
