//! Expression → subgraph lowering.

use crate::compute_graph::{
    ExpressionNode, NodeId, NodeKind, NodeMetadata, ProjectionColumn, ProjectionNode, SourceNode,
};
use crate::screener_query::{
    AggregateExpression, Expression, FilterOp, MathExpression, MetricExpression,
};

use super::{BuildError, IrBuilder};

/// Auto-generated aliases are capped at this many characters.
const MAX_ALIAS_LEN: usize = 65;

impl<'a> IrBuilder<'a> {
    /// Lower an expression, returning the node id and the label downstream
    /// filter conditions use for it (metric name or alias).
    pub(super) fn lower_expression(
        &mut self,
        expr: &Expression,
    ) -> Result<(NodeId, Option<String>), BuildError> {
        self.lower_expression_with_op(expr, None)
    }

    /// Same as [`lower_expression`], with the comparison operator threaded
    /// through so LIKE values wrap at parameter-creation time.
    pub(super) fn lower_expression_with_op(
        &mut self,
        expr: &Expression,
        op: Option<FilterOp>,
    ) -> Result<(NodeId, Option<String>), BuildError> {
        match expr {
            Expression::Metric(metric) => self.lower_metric(metric),
            Expression::Math(math) => self.lower_math(expr, math),
            Expression::Aggregate(agg) => self.lower_aggregate(agg),
            Expression::Constant(value) => {
                let rendered = self.params.create_parameter(value, op)?;
                let id = self.graph.add_node(
                    NodeKind::Expression(ExpressionNode {
                        expression: expr.clone(),
                        alias: None,
                        rendered: Some(rendered),
                    }),
                    vec![],
                    NodeMetadata {
                        is_parameter: true,
                        ..Default::default()
                    },
                );
                Ok((id, None))
            }
        }
    }

    fn lower_metric(
        &mut self,
        metric: &MetricExpression,
    ) -> Result<(NodeId, Option<String>), BuildError> {
        let mapping = self
            .config
            .resolve_metric(&metric.metric)
            .ok_or_else(|| BuildError::UnknownMetric(metric.metric.clone()))?;
        let table = mapping.table.clone();
        let column = mapping.column.clone();

        let source_id = self.find_or_create_source(&table);
        let alias = metric.alias.clone().or_else(|| {
            // Only alias when the metric name differs from the column.
            (metric.metric != column).then(|| metric.metric.clone())
        });

        let projection_id = self.graph.add_node(
            NodeKind::Projection(ProjectionNode {
                columns: vec![ProjectionColumn {
                    name: Some(column),
                    expression: None,
                    alias: alias.clone(),
                    source_node: Some(source_id.clone()),
                }],
            }),
            vec![source_id],
            NodeMetadata::default(),
        );

        if let Some(filter) = &metric.filter {
            self.lower_filter(filter, Some(&projection_id))?;
        }

        let label = alias.or_else(|| Some(metric.metric.clone()));
        Ok((projection_id, label))
    }

    fn lower_math(
        &mut self,
        expr: &Expression,
        math: &MathExpression,
    ) -> Result<(NodeId, Option<String>), BuildError> {
        let mut inputs: Vec<NodeId> = Vec::new();
        for operand in &math.operands {
            // Constant operands stay embedded in the stored expression; the
            // translator inlines or parameterizes them in place.
            if operand.is_constant() {
                continue;
            }
            let (id, _) = self.lower_expression(operand)?;
            if !inputs.contains(&id) {
                inputs.push(id);
            }
        }
        let id = self.graph.add_node(
            NodeKind::Expression(ExpressionNode {
                expression: expr.clone(),
                alias: math.alias.clone(),
                rendered: None,
            }),
            inputs,
            NodeMetadata::default(),
        );
        Ok((id, math.alias.clone()))
    }

    fn lower_aggregate(
        &mut self,
        agg: &AggregateExpression,
    ) -> Result<(NodeId, Option<String>), BuildError> {
        let (target_id, target_label) = self.lower_expression(&agg.target)?;

        // Lower the inline filter against the target projection, then strip
        // it from the stored expression so the translator never sees it
        // twice.
        if let Some(filter) = &agg.filter {
            self.lower_filter(filter, Some(&target_id))?;
        }
        let mut stored = agg.clone();
        stored.filter = None;

        let alias = agg
            .alias
            .clone()
            .unwrap_or_else(|| auto_alias(agg, target_label.as_deref()));
        stored.alias = Some(alias.clone());

        let id = self.graph.add_node(
            NodeKind::Expression(ExpressionNode {
                expression: Expression::Aggregate(Box::new(stored)),
                alias: Some(alias.clone()),
                rendered: None,
            }),
            vec![target_id],
            NodeMetadata::default(),
        );
        Ok((id, Some(alias)))
    }

    pub(super) fn find_or_create_source(&mut self, table: &str) -> NodeId {
        if let Some(id) = self.table_sources.get(table) {
            return id.clone();
        }
        let time_column = self
            .config
            .table(table)
            .and_then(|t| t.time_column.clone());
        let id = self.graph.add_node(
            NodeKind::Source(SourceNode {
                table: table.to_string(),
                time_column,
            }),
            vec![],
            NodeMetadata::default(),
        );
        self.table_sources.insert(table.to_string(), id.clone());
        id
    }
}

/// `<agg>_<target>[_<range>]`, truncated to 65 chars.
fn auto_alias(agg: &AggregateExpression, target_label: Option<&str>) -> String {
    let mut alias = format!(
        "{}_{}",
        agg.aggregation.as_str(),
        target_label.unwrap_or("value")
    );
    if let Some(range) = &agg.time_range {
        alias.push('_');
        alias.push_str(&range.range_alias());
    }
    alias.truncate(MAX_ALIAS_LEN);
    alias
}
