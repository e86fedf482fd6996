//! Required-columns pass.
//!
//! Every source contributes its table's `always_include_columns`, plus the
//! time column when a windowed aggregate depends on the source. Columns
//! already projected are skipped, which also makes the pass idempotent —
//! it runs after lowering and again after the optimizer.

use std::collections::HashSet;

use crate::compute_graph::{
    ComputeGraph, NodeId, NodeKind, NodeMetadata, ProjectionColumn, ProjectionNode,
};
use crate::config::ScreenerConfig;
use crate::screener_query::Expression;

pub fn add_required_columns(graph: &mut ComputeGraph, config: &ScreenerConfig) {
    let join_id = graph
        .nodes()
        .find(|n| matches!(n.kind, NodeKind::Join(_)))
        .map(|n| n.id.clone());

    for source_id in graph.source_ids() {
        let table = match &graph.node(&source_id).expect("source id from graph").kind {
            NodeKind::Source(s) => s.table.clone(),
            _ => continue,
        };
        let Some(table_cfg) = config.table(&table) else {
            continue;
        };

        let mut wanted: Vec<String> = table_cfg.always_include_columns.clone();
        if let Some(time_column) = &table_cfg.time_column {
            if !wanted.iter().any(|c| c == time_column)
                && source_feeds_timed_aggregate(graph, &source_id)
            {
                wanted.push(time_column.clone());
            }
        }
        if wanted.is_empty() {
            continue;
        }

        let projected = projected_columns(graph, &source_id, join_id.as_deref(), table_cfg);
        for column in wanted {
            if projected.contains(&column) {
                continue;
            }
            graph.add_node(
                NodeKind::Projection(ProjectionNode {
                    columns: vec![ProjectionColumn {
                        name: Some(column),
                        expression: None,
                        alias: None,
                        source_node: Some(source_id.clone()),
                    }],
                }),
                vec![source_id.clone()],
                NodeMetadata {
                    is_required_projection: true,
                    ..Default::default()
                },
            );
        }
    }
}

/// Column names already projected from this table, whether the projection
/// still points at the source or was rewired onto the join.
fn projected_columns(
    graph: &ComputeGraph,
    source_id: &str,
    join_id: Option<&str>,
    table_cfg: &crate::config::TableConfig,
) -> HashSet<String> {
    let mut columns = HashSet::new();
    for node in graph.nodes() {
        let NodeKind::Projection(projection) = &node.kind else {
            continue;
        };
        for column in &projection.columns {
            let Some(name) = &column.name else { continue };
            let attributed = match column.source_node.as_deref() {
                Some(sn) if sn == source_id => true,
                Some(sn) if Some(sn) == join_id => table_cfg.has_column(name),
                _ => false,
            };
            if attributed {
                columns.insert(name.clone());
            }
        }
    }
    columns
}

fn source_feeds_timed_aggregate(graph: &ComputeGraph, source_id: &str) -> bool {
    graph.nodes().any(|node| {
        let NodeKind::Expression(expr) = &node.kind else {
            return false;
        };
        let Expression::Aggregate(agg) = &expr.expression else {
            return false;
        };
        agg.time_range.is_some() && reachable_inputs(graph, &node.id).contains(source_id)
    })
}

/// Transitive input closure of a node.
fn reachable_inputs(graph: &ComputeGraph, id: &str) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut stack = vec![id.to_string()];
    while let Some(current) = stack.pop() {
        let Some(node) = graph.node(&current) else {
            continue;
        };
        for input in &node.inputs {
            if seen.insert(input.clone()) {
                stack.push(input.clone());
            }
        }
    }
    seen
}
