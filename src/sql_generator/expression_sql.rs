//! Expression → SQL fragment translation.
//!
//! A fragment carries the rendered column text, any WHERE predicates the
//! expression contributes (date ranges for windowed aggregates), and
//! whether the text is a window function — the signal the filter
//! translator uses for WHERE vs QUALIFY placement.

use crate::compute_graph::{NodeId, NodeKind};
use crate::config::TableConfig;
use crate::ir_builder::parameters::format_number;
use crate::screener_query::{
    AggregateExpression, Aggregation, Expression, MathExpression, MetricExpression, TimeRange,
};

use super::errors::SqlError;
use super::time_window::range_predicate;
use super::SqlGenerator;

#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    pub column: String,
    pub where_clauses: Vec<String>,
    pub is_window: bool,
}

impl SqlFragment {
    pub fn plain(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ..Default::default()
        }
    }
}

impl<'a> SqlGenerator<'a> {
    /// Translate an expression node for a SELECT list.
    pub(super) fn translate_expression_node(&mut self, id: &str) -> Result<SqlFragment, SqlError> {
        let Some(node) = self.graph.node(id) else {
            return Ok(SqlFragment::default());
        };
        let NodeKind::Expression(expr_node) = &node.kind else {
            return Ok(SqlFragment::default());
        };
        if let Some(rendered) = &expr_node.rendered {
            return Ok(SqlFragment::plain(rendered.clone()));
        }
        let expression = expr_node.expression.clone();
        let inputs = node.inputs.clone();
        match &expression {
            Expression::Aggregate(agg) => self.translate_aggregate(agg),
            Expression::Math(math) => self.translate_math(math, &inputs),
            Expression::Metric(metric) => self.translate_metric_reference(metric),
            Expression::Constant(value) => {
                Ok(SqlFragment::plain(self.params.create_parameter(value, None)?))
            }
        }
    }

    /// Translate an operand appearing inside another expression or filter
    /// side. Operands that correspond to an input node collapse to that
    /// node's alias instead of being re-emitted inline.
    pub(super) fn translate_operand(
        &mut self,
        expr: &Expression,
        inputs: &[NodeId],
    ) -> Result<SqlFragment, SqlError> {
        match expr {
            Expression::Constant(value) => {
                Ok(SqlFragment::plain(self.params.create_parameter(value, None)?))
            }
            Expression::Metric(metric) => {
                if let Some(output) = self.find_projection_output(metric, inputs) {
                    return Ok(SqlFragment::plain(output));
                }
                self.translate_metric_reference(metric)
            }
            Expression::Aggregate(agg) => {
                if let Some((alias, windowed)) = self.find_aggregate_input(agg, inputs) {
                    return Ok(SqlFragment {
                        column: alias,
                        where_clauses: vec![],
                        is_window: windowed,
                    });
                }
                self.translate_aggregate(agg)
            }
            Expression::Math(math) => {
                if let Some(alias) = self.find_math_input(math, inputs) {
                    return Ok(SqlFragment::plain(alias));
                }
                self.translate_math(math, inputs)
            }
        }
    }

    pub(super) fn translate_math(
        &mut self,
        math: &MathExpression,
        inputs: &[NodeId],
    ) -> Result<SqlFragment, SqlError> {
        let mut parts = Vec::with_capacity(math.operands.len());
        let mut where_clauses = Vec::new();
        let mut is_window = false;
        for operand in &math.operands {
            let fragment = self.translate_operand(operand, inputs)?;
            parts.push(fragment.column);
            where_clauses.extend(fragment.where_clauses);
            is_window |= fragment.is_window;
        }

        let column = if math.operator.is_function() {
            format!("{}({})", math.operator.sql(), parts.join(", "))
        } else if parts.len() == 1 {
            parts.remove(0)
        } else {
            format!("({})", parts.join(&format!(" {} ", math.operator.sql())))
        };
        Ok(SqlFragment {
            column,
            where_clauses,
            is_window,
        })
    }

    pub(super) fn translate_aggregate(
        &mut self,
        agg: &AggregateExpression,
    ) -> Result<SqlFragment, SqlError> {
        let target = self.translate_operand(&agg.target, &[])?;
        let column = target.column;

        let table = self.anchor_table(&agg.target);
        let partition_key = table
            .and_then(|t| t.primary_keys.first().cloned())
            .unwrap_or_else(|| "ticker".to_string());
        let time_column = table
            .and_then(|t| t.time_column.clone())
            .unwrap_or_else(|| partition_key.clone());

        let trading_frame = match &agg.time_range {
            Some(TimeRange::Trading { duration, .. }) => Some(format!(
                "ROWS BETWEEN {} PRECEDING AND CURRENT ROW",
                duration.saturating_sub(1)
            )),
            _ => None,
        };
        let edge_frame = trading_frame
            .clone()
            .unwrap_or_else(|| "ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING".into());
        let over_edge = format!(
            "OVER (PARTITION BY {} ORDER BY {} ASC {})",
            partition_key, time_column, edge_frame
        );
        let over_running = match &trading_frame {
            Some(frame) => format!(
                "OVER (PARTITION BY {} ORDER BY {} {})",
                partition_key, time_column, frame
            ),
            None => format!(
                "OVER (PARTITION BY {} ORDER BY {})",
                partition_key, time_column
            ),
        };

        let first = format!("first_value({}) {}", column, over_edge);
        let last = format!("last_value({}) {}", column, over_edge);
        let sql = match agg.aggregation {
            Aggregation::First => first,
            Aggregation::Last => last,
            Aggregation::Diff => format!("{} - {}", last, first),
            Aggregation::DiffPct => {
                format!("({} - {}) / nullIf({}, 0) * 100", last, first, first)
            }
            Aggregation::Median => format!("quantile(0.5)({}) {}", column, over_running),
            Aggregation::Percentile => {
                let level = agg
                    .params
                    .as_ref()
                    .and_then(|p| p.percentile)
                    .unwrap_or(0.5);
                format!("quantile({})({}) {}", format_number(level), column, over_running)
            }
            Aggregation::Stddev => format!("stddevPopStable({}) {}", column, over_running),
            Aggregation::Variance => format!("varPop({}) {}", column, over_running),
            Aggregation::Ema => {
                let span = agg.params.as_ref().and_then(|p| p.span).unwrap_or(10);
                format!(
                    "exponentialMovingAverage({})({}, toUnixTimestamp({})) {}",
                    span, column, time_column, over_running
                )
            }
            Aggregation::Avg
            | Aggregation::Sum
            | Aggregation::Min
            | Aggregation::Max
            | Aggregation::Count => {
                let name = running_function(&agg.aggregation).ok_or_else(|| {
                    SqlError::UnsupportedAggregation(agg.aggregation.as_str().to_string())
                })?;
                format!("{}({}) {}", name, column, over_running)
            }
        };

        let mut where_clauses = target.where_clauses;
        if let Some(range) = &agg.time_range {
            if let Some(predicate) =
                range_predicate(range, &time_column, &self.config.time_format)
            {
                where_clauses.push(predicate);
            }
        }

        Ok(SqlFragment {
            column: sql,
            where_clauses,
            is_window: agg.time_range.is_some(),
        })
    }

    fn translate_metric_reference(
        &mut self,
        metric: &MetricExpression,
    ) -> Result<SqlFragment, SqlError> {
        if let Some(alias) = &metric.alias {
            return Ok(SqlFragment::plain(alias.clone()));
        }
        let mapping = self
            .config
            .resolve_metric(&metric.metric)
            .ok_or_else(|| SqlError::UnknownMetric(metric.metric.clone()))?;
        Ok(SqlFragment::plain(mapping.column.clone()))
    }

    /// The output name of an input projection exposing this metric.
    fn find_projection_output(
        &self,
        metric: &MetricExpression,
        inputs: &[NodeId],
    ) -> Option<String> {
        let mapping = self.config.resolve_metric(&metric.metric)?;
        for input in inputs {
            let Some(node) = self.graph.node(input) else {
                continue;
            };
            let NodeKind::Projection(projection) = &node.kind else {
                continue;
            };
            for column in &projection.columns {
                if column.name.as_deref() == Some(mapping.column.as_str()) {
                    return column.output_name().map(str::to_string);
                }
            }
        }
        None
    }

    /// Alias of an input expression node carrying this aggregate.
    fn find_aggregate_input(
        &self,
        agg: &AggregateExpression,
        inputs: &[NodeId],
    ) -> Option<(String, bool)> {
        let mut matches: Vec<(String, bool)> = Vec::new();
        for input in inputs {
            let Some(node) = self.graph.node(input) else {
                continue;
            };
            let NodeKind::Expression(expr_node) = &node.kind else {
                continue;
            };
            let Expression::Aggregate(candidate) = &expr_node.expression else {
                continue;
            };
            if candidate.aggregation != agg.aggregation {
                continue;
            }
            let ranges_align = match (&candidate.time_range, &agg.time_range) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same_kind(b),
                _ => false,
            };
            if ranges_align && agg.target.structurally_equal(&candidate.target) {
                if let Some(alias) = &expr_node.alias {
                    matches.push((alias.clone(), candidate.time_range.is_some()));
                }
            }
        }
        matches.into_iter().next()
    }

    fn find_math_input(&self, math: &MathExpression, inputs: &[NodeId]) -> Option<String> {
        for input in inputs {
            let Some(node) = self.graph.node(input) else {
                continue;
            };
            let NodeKind::Expression(expr_node) = &node.kind else {
                continue;
            };
            let Expression::Math(candidate) = &expr_node.expression else {
                continue;
            };
            if candidate.operator == math.operator
                && candidate.operands.len() == math.operands.len()
            {
                if let Some(alias) = &expr_node.alias {
                    return Some(alias.clone());
                }
            }
        }
        None
    }

    /// The table the expression is ultimately computed over (first metric
    /// found walking the tree).
    pub(super) fn anchor_table(&self, expr: &Expression) -> Option<&'a TableConfig> {
        match expr {
            Expression::Metric(metric) => {
                let mapping = self.config.resolve_metric(&metric.metric)?;
                self.config.table(&mapping.table)
            }
            Expression::Math(math) => math.operands.iter().find_map(|o| self.anchor_table(o)),
            Expression::Aggregate(agg) => self.anchor_table(&agg.target),
            Expression::Constant(_) => None,
        }
    }
}

fn running_function(aggregation: &Aggregation) -> Option<&'static str> {
    match aggregation {
        Aggregation::Avg => Some("avg"),
        Aggregation::Sum => Some("sum"),
        Aggregation::Min => Some("min"),
        Aggregation::Max => Some("max"),
        Aggregation::Count => Some("count"),
        _ => None,
    }
}
