//! Mermaid rendering of the compute graph.
//!
//! Output starts with the fixed `graph TD;` header; body lines are sorted
//! so the rendering is stable across runs. Node shapes encode kinds:
//! cylinders for sources, rhombi for filters, circles for composite
//! filters, subroutines for projections, rounded boxes for expressions,
//! rectangles for sorts, stadiums for limits.

use std::collections::HashMap;

use crate::compute_graph::{ComputeGraph, FilterOperand, NodeId, NodeKind, SortKey};
use crate::screener_query::{ConstantValue, Expression};

pub fn render_diagram(graph: &ComputeGraph) -> String {
    let render_ids = build_render_ids(graph);
    let rid = |id: &NodeId| -> String {
        render_ids
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.clone())
    };

    let mut lines: Vec<String> = Vec::new();
    for node in graph.nodes() {
        let id = rid(&node.id);
        let line = match &node.kind {
            NodeKind::Source(source) => format!("{}[({})]", id, source.table),
            NodeKind::Filter(filter) => {
                let left = operand_label(graph, &filter.condition.left);
                let right = operand_label(graph, &filter.condition.right);
                format!(
                    "{}{{{} {} {}}}",
                    id,
                    left,
                    filter.condition.op.sql(),
                    right
                )
            }
            NodeKind::CompositeFilter(composite) => {
                format!("{}(({}))", id, composite.operator.sql())
            }
            NodeKind::Projection(projection) => {
                let columns: Vec<&str> = projection
                    .columns
                    .iter()
                    .filter_map(|c| c.output_name())
                    .collect();
                let heading = if node.metadata.is_grouping {
                    "GROUP BY"
                } else {
                    "Project"
                };
                format!("{}[[{}\\n{}]]", id, heading, columns.join(", "))
            }
            NodeKind::Expression(expr) => format!("{}({})", id, expression_label(expr)),
            NodeKind::Sort(sort) => {
                let criteria: Vec<String> = sort
                    .criteria
                    .iter()
                    .map(|c| {
                        let key = match &c.key {
                            SortKey::Node(node_id) => node_label(graph, node_id),
                            SortKey::Raw(text) => text.clone(),
                        };
                        format!("{} {}", key, c.direction.as_str())
                    })
                    .collect();
                let mut label = format!("Sort {}", criteria.join(", "));
                if let Some(dimension) = &node.metadata.group_dimension {
                    label.push_str(&format!(" BY {}", dimension));
                }
                format!("{}[{}]", id, label)
            }
            NodeKind::Limit(limit) => {
                let mut label = format!("Limit {}", limit.limit);
                if let Some(dimension) = &node.metadata.group_dimension {
                    label.push_str(&format!(" BY {}", dimension));
                }
                format!("{}([{}])", id, label)
            }
            NodeKind::Join(join) => {
                let label = match join.conditions.first() {
                    Some(condition) => format!(
                        "Join {} with {} on {} = {}",
                        condition.left.table,
                        condition.right.table,
                        condition.left.column,
                        condition.right.column
                    ),
                    None => "Join".to_string(),
                };
                format!("{}[{}]", id, label)
            }
        };
        lines.push(line);

        for input in &node.inputs {
            lines.push(format!("{} --> {}", rid(input), id));
        }
    }

    lines.sort();
    let mut out = String::from("graph TD;\n");
    out.push_str(&lines.join("\n"));
    out
}

/// Sources render under their table name, suffixed `_2`, `_3`, ... when a
/// table is scanned more than once. Everything else keeps its node id.
fn build_render_ids(graph: &ComputeGraph) -> HashMap<NodeId, String> {
    let mut table_counts: HashMap<String, usize> = HashMap::new();
    let mut render_ids = HashMap::new();
    for node in graph.nodes() {
        if let NodeKind::Source(source) = &node.kind {
            let count = table_counts.entry(source.table.clone()).or_insert(0);
            *count += 1;
            let name = if *count == 1 {
                source.table.clone()
            } else {
                format!("{}_{}", source.table, count)
            };
            render_ids.insert(node.id.clone(), name);
        }
    }
    render_ids
}

fn operand_label(graph: &ComputeGraph, operand: &FilterOperand) -> String {
    match operand {
        FilterOperand::NodeRef { input, metric } => metric
            .clone()
            .unwrap_or_else(|| node_label(graph, input)),
        FilterOperand::Parameter { parameter } => parameter.clone(),
        FilterOperand::Literal(expr) => inline_expression_label(expr),
    }
}

fn node_label(graph: &ComputeGraph, id: &str) -> String {
    graph
        .node(id)
        .map(|node| match &node.kind {
            NodeKind::Expression(expr) => expression_label(expr),
            NodeKind::Projection(projection) => projection
                .columns
                .first()
                .and_then(|c| c.output_name())
                .unwrap_or(id)
                .to_string(),
            _ => id.to_string(),
        })
        .unwrap_or_else(|| id.to_string())
}

fn expression_label(expr: &crate::compute_graph::ExpressionNode) -> String {
    if let Some(alias) = &expr.alias {
        return alias.clone();
    }
    if let Some(rendered) = &expr.rendered {
        return rendered.clone();
    }
    inline_expression_label(&expr.expression)
}

fn inline_expression_label(expr: &Expression) -> String {
    match expr {
        Expression::Constant(value) => constant_label(value),
        Expression::Metric(metric) => metric.metric.clone(),
        Expression::Math(math) => format!("{} expression", math.operator.sql()),
        Expression::Aggregate(agg) => agg.aggregation.as_str().to_string(),
    }
}

fn constant_label(value: &ConstantValue) -> String {
    match value {
        ConstantValue::Bool(b) => b.to_string(),
        ConstantValue::Number(n) => n.to_string(),
        ConstantValue::String(s) => s.clone(),
        ConstantValue::List(items) => format!("[{} items]", items.len()),
    }
}
