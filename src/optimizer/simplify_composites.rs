//! Degenerate composite-filter removal.
//!
//! A composite with exactly one child is a no-op wrapper (`and`/`or` over a
//! single filter): dependents are rewired to consume the child directly and
//! the wrapper is removed. `not` composites are kept — they negate.

use crate::compute_graph::{ComputeGraph, NodeId, NodeKind};
use crate::screener_query::LogicalOperator;

use super::graph_pass::{GraphPass, OptimizerResult};

pub struct SimplifyComposites;

impl GraphPass for SimplifyComposites {
    fn name(&self) -> &'static str {
        "simplify_composites"
    }

    fn apply(&self, graph: &mut ComputeGraph) -> OptimizerResult<bool> {
        let mut changed = false;
        loop {
            let degenerate: Option<(NodeId, NodeId)> = graph.nodes().find_map(|node| {
                match &node.kind {
                    NodeKind::CompositeFilter(c)
                        if c.operator != LogicalOperator::Not && node.inputs.len() == 1 =>
                    {
                        Some((node.id.clone(), node.inputs[0].clone()))
                    }
                    _ => None,
                }
            });
            let Some((composite_id, child_id)) = degenerate else {
                break;
            };
            graph.replace_node_id(&composite_id, &child_id, None);
            graph.remove_node(&composite_id);
            changed = true;
        }
        Ok(changed)
    }
}
