//! Duplicate-projection removal.
//!
//! Two projections are duplicates when they share the same sorted input-id
//! set, the same sorted column fingerprints, and their dependents consume
//! them in equivalent contexts (input sets compared with the projection
//! itself and parameter nodes normalized out). Non-required projections are
//! processed first; required projections only merge with required ones.

use std::collections::BTreeSet;

use crate::compute_graph::{ComputeGraph, NodeId, NodeKind};

use super::graph_pass::{GraphPass, OptimizerResult};

pub struct DedupProjections;

impl GraphPass for DedupProjections {
    fn name(&self) -> &'static str {
        "dedup_projections"
    }

    fn apply(&self, graph: &mut ComputeGraph) -> OptimizerResult<bool> {
        let mut changed = false;
        for required_round in [false, true] {
            let candidates: Vec<NodeId> = graph
                .nodes()
                .filter(|n| matches!(n.kind, NodeKind::Projection(_)))
                .filter(|n| n.metadata.is_required_projection == required_round)
                .map(|n| n.id.clone())
                .collect();

            let mut kept: Vec<NodeId> = Vec::new();
            for id in candidates {
                if !graph.contains(&id) {
                    continue;
                }
                let keeper = kept
                    .iter()
                    .find(|keeper| is_duplicate(graph, keeper, &id))
                    .cloned();
                match keeper {
                    Some(keeper) => {
                        graph.replace_node_id(&id, &keeper, None);
                        graph.remove_node(&id);
                        changed = true;
                    }
                    None => kept.push(id),
                }
            }
        }
        Ok(changed)
    }
}

fn is_duplicate(graph: &ComputeGraph, a: &str, b: &str) -> bool {
    let (Some(node_a), Some(node_b)) = (graph.node(a), graph.node(b)) else {
        return false;
    };

    if sorted(&node_a.inputs) != sorted(&node_b.inputs) {
        return false;
    }

    let (NodeKind::Projection(proj_a), NodeKind::Projection(proj_b)) =
        (&node_a.kind, &node_b.kind)
    else {
        return false;
    };
    let fingerprint = |p: &crate::compute_graph::ProjectionNode| -> BTreeSet<String> {
        p.columns.iter().map(|c| c.fingerprint()).collect()
    };
    if fingerprint(proj_a) != fingerprint(proj_b) {
        return false;
    }

    dependents_profile(graph, a) == dependents_profile(graph, b)
}

/// For each dependent, its sorted input set with the projection itself and
/// parameter nodes removed. Sorted so the comparison ignores dependent
/// order.
fn dependents_profile(graph: &ComputeGraph, id: &str) -> Vec<Vec<NodeId>> {
    let mut profile: Vec<Vec<NodeId>> = graph
        .find_dependents(id)
        .iter()
        .filter_map(|dep_id| graph.node(dep_id))
        .map(|dep| {
            let mut inputs: Vec<NodeId> = dep
                .inputs
                .iter()
                .filter(|input| input.as_str() != id)
                .filter(|input| {
                    graph
                        .node(input)
                        .map(|n| !n.metadata.is_parameter)
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            inputs.sort();
            inputs
        })
        .collect();
    profile.sort();
    profile
}

fn sorted(ids: &[NodeId]) -> Vec<NodeId> {
    let mut out = ids.to_vec();
    out.sort();
    out
}
