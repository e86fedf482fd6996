//! Duplicate projection-expression removal.
//!
//! An expression node whose only input is a projection and which has a
//! single dependent is folded into an earlier, structurally equal
//! expression. The duplicate's projection input is removed too when
//! nothing else consumes it.

use crate::compute_graph::{ComputeGraph, NodeId, NodeKind};

use super::graph_pass::{GraphPass, OptimizerResult};

pub struct DedupExpressions;

impl GraphPass for DedupExpressions {
    fn name(&self) -> &'static str {
        "dedup_expressions"
    }

    fn apply(&self, graph: &mut ComputeGraph) -> OptimizerResult<bool> {
        let candidates: Vec<NodeId> = graph
            .nodes()
            .filter(|n| matches!(n.kind, NodeKind::Expression(_)) && !n.metadata.is_parameter)
            .map(|n| n.id.clone())
            .collect();

        let mut changed = false;
        for (index, id) in candidates.iter().enumerate() {
            if !graph.contains(id) {
                continue;
            }
            let node = graph.node(id).expect("checked above");
            let single_projection_input = node.inputs.len() == 1
                && graph
                    .node(&node.inputs[0])
                    .map(|n| matches!(n.kind, NodeKind::Projection(_)))
                    .unwrap_or(false);
            if !single_projection_input || graph.find_dependents(id).len() != 1 {
                continue;
            }

            let expression = match &node.kind {
                NodeKind::Expression(e) => e.expression.clone(),
                _ => continue,
            };
            let projection_input = node.inputs[0].clone();

            let earlier = candidates[..index].iter().find(|candidate| {
                graph
                    .node(candidate)
                    .map(|n| match &n.kind {
                        NodeKind::Expression(e) => e.expression.structurally_equal(&expression),
                        _ => false,
                    })
                    .unwrap_or(false)
            });
            let Some(earlier) = earlier.cloned() else {
                continue;
            };

            let alias = graph.node(&earlier).and_then(|n| match &n.kind {
                NodeKind::Expression(e) => e.alias.clone(),
                _ => None,
            });
            graph.replace_node_id(id, &earlier, alias.as_deref());
            graph.remove_node(id);
            if graph.find_dependents(&projection_input).is_empty()
                && graph
                    .node(&projection_input)
                    .map(|n| !n.metadata.is_required_projection)
                    .unwrap_or(false)
            {
                graph.remove_node(&projection_input);
            }
            changed = true;
        }
        Ok(changed)
    }
}
