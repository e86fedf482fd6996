//! Filter merging.
//!
//! Filter and composite-filter nodes with an identical sorted input-id
//! list are grouped under a fresh `and` composite, and their former
//! dependents are rewired onto it. Filters already owned by a composite
//! (any composite-filter dependent) are left alone, which keeps the pass
//! idempotent.

use indexmap::IndexMap;

use crate::compute_graph::{
    ComputeGraph, CompositeFilterNode, NodeId, NodeKind, NodeMetadata,
};
use crate::screener_query::LogicalOperator;

use super::graph_pass::{GraphPass, OptimizerResult};

pub struct MergeFilters;

impl GraphPass for MergeFilters {
    fn name(&self) -> &'static str {
        "merge_filters"
    }

    fn apply(&self, graph: &mut ComputeGraph) -> OptimizerResult<bool> {
        let mut groups: IndexMap<Vec<NodeId>, Vec<NodeId>> = IndexMap::new();
        for node in graph.nodes() {
            if !node.kind.is_filterish() || node.inputs.is_empty() {
                continue;
            }
            let already_composed = graph.find_dependents(&node.id).iter().any(|dep| {
                graph
                    .node(dep)
                    .map(|d| matches!(d.kind, NodeKind::CompositeFilter(_)))
                    .unwrap_or(false)
            });
            if already_composed {
                continue;
            }
            let mut key = node.inputs.clone();
            key.sort();
            groups.entry(key).or_default().push(node.id.clone());
        }

        let mut changed = false;
        for (_, members) in groups {
            if members.len() < 2 {
                continue;
            }
            let composite_id = graph.add_node(
                NodeKind::CompositeFilter(CompositeFilterNode {
                    operator: LogicalOperator::And,
                }),
                members.clone(),
                NodeMetadata::default(),
            );
            for member in &members {
                // Rewire every former dependent; the composite's own input
                // list is left intact by replace_node_id.
                graph.replace_node_id(member, &composite_id, None);
            }
            changed = true;
        }
        Ok(changed)
    }
}
