//! Join inference: a single multi-way INNER JOIN over all referenced tables.

use crate::compute_graph::{
    ComputeGraph, JoinCondition, JoinKey, JoinNode, NodeId, NodeKind, NodeMetadata,
};
use crate::compute_graph::node::JoinType;
use crate::config::ScreenerConfig;
use crate::screener_query::FilterOp;

use super::BuildError;

/// With two or more source nodes, emit one INNER JOIN keyed by the shared
/// primary key of every table pair, then rewire all downstream references
/// from the individual sources onto the join node.
pub fn infer_join(
    graph: &mut ComputeGraph,
    config: &ScreenerConfig,
) -> Result<Option<NodeId>, BuildError> {
    let sources = graph.source_ids();
    if sources.len() <= 1 {
        return Ok(None);
    }

    let tables: Vec<(NodeId, String)> = sources
        .iter()
        .map(|id| {
            let table = match &graph.node(id).expect("source id from graph").kind {
                NodeKind::Source(s) => s.table.clone(),
                _ => unreachable!("source_ids returns only source nodes"),
            };
            (id.clone(), table)
        })
        .collect();

    let mut conditions = Vec::new();
    for i in 0..tables.len() {
        for j in (i + 1)..tables.len() {
            let (left_id, left_table) = &tables[i];
            let (right_id, right_table) = &tables[j];
            let pk = config
                .common_primary_key(left_table, right_table)
                .ok_or_else(|| {
                    BuildError::NoCommonPrimaryKey(left_table.clone(), right_table.clone())
                })?;
            conditions.push(JoinCondition {
                left: JoinKey {
                    node: left_id.clone(),
                    table: left_table.clone(),
                    column: pk.clone(),
                },
                right: JoinKey {
                    node: right_id.clone(),
                    table: right_table.clone(),
                    column: pk,
                },
                op: FilterOp::Eq,
            });
        }
    }

    let join_id = graph.add_node(
        NodeKind::Join(JoinNode {
            join_type: JoinType::Inner,
            conditions,
        }),
        sources.clone(),
        NodeMetadata::default(),
    );

    for source in &sources {
        graph.replace_node_id(source, &join_id, None);
        if let Some(node) = graph.node_mut(source) {
            node.is_terminal = false;
        }
    }

    log::debug!(
        "Join inference: {} sources joined as {}",
        sources.len(),
        join_id
    );
    Ok(Some(join_id))
}
