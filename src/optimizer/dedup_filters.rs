//! Duplicate-filter removal (risky).
//!
//! Filters whose inputs are all projections collapse when their input
//! lists match in order, their metadata matches, and their conditions are
//! identical.

use crate::compute_graph::{ComputeGraph, NodeId, NodeKind};

use super::graph_pass::{GraphPass, OptimizerResult};

pub struct DedupFilters;

impl GraphPass for DedupFilters {
    fn name(&self) -> &'static str {
        "dedup_filters"
    }

    fn apply(&self, graph: &mut ComputeGraph) -> OptimizerResult<bool> {
        let candidates: Vec<NodeId> = graph
            .nodes()
            .filter(|n| matches!(n.kind, NodeKind::Filter(_)))
            .filter(|n| {
                !n.inputs.is_empty()
                    && n.inputs.iter().all(|input| {
                        graph
                            .node(input)
                            .map(|i| matches!(i.kind, NodeKind::Projection(_)))
                            .unwrap_or(false)
                    })
            })
            .map(|n| n.id.clone())
            .collect();

        let mut changed = false;
        let mut kept: Vec<NodeId> = Vec::new();
        for id in candidates {
            if !graph.contains(&id) {
                continue;
            }
            let duplicate_of = kept.iter().find(|keeper| is_duplicate(graph, keeper, &id));
            match duplicate_of.cloned() {
                Some(keeper) => {
                    graph.replace_node_id(&id, &keeper, None);
                    graph.remove_node(&id);
                    changed = true;
                }
                None => kept.push(id),
            }
        }
        Ok(changed)
    }
}

fn is_duplicate(graph: &ComputeGraph, a: &str, b: &str) -> bool {
    let (Some(node_a), Some(node_b)) = (graph.node(a), graph.node(b)) else {
        return false;
    };
    if node_a.inputs != node_b.inputs || node_a.metadata != node_b.metadata {
        return false;
    }
    match (&node_a.kind, &node_b.kind) {
        (NodeKind::Filter(fa), NodeKind::Filter(fb)) => fa.condition == fb.condition,
        _ => false,
    }
}
