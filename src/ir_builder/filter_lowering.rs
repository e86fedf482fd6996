//! Filter → subgraph lowering.

use crate::compute_graph::{
    CompositeFilterNode, FilterCondition, FilterNode, FilterOperand, NodeId, NodeKind,
    NodeMetadata,
};
use crate::screener_query::{Filter, SimpleFilter};

use super::{BuildError, IrBuilder};

impl<'a> IrBuilder<'a> {
    /// Lower a filter tree. `extra_input` attaches an owning projection
    /// (metric- or aggregate-level inline filters) to every emitted filter
    /// node.
    pub(super) fn lower_filter(
        &mut self,
        filter: &Filter,
        extra_input: Option<&NodeId>,
    ) -> Result<NodeId, BuildError> {
        match filter {
            Filter::Simple(simple) => self.lower_simple_filter(simple, extra_input),
            Filter::Composite(composite) => {
                let mut child_ids: Vec<NodeId> = Vec::new();
                for child in &composite.filters {
                    let id = self.lower_filter(child, extra_input)?;
                    if !child_ids.contains(&id) {
                        child_ids.push(id);
                    }
                }
                Ok(self.graph.add_node(
                    NodeKind::CompositeFilter(CompositeFilterNode {
                        operator: composite.operator,
                    }),
                    child_ids,
                    NodeMetadata::default(),
                ))
            }
        }
    }

    fn lower_simple_filter(
        &mut self,
        filter: &SimpleFilter,
        extra_input: Option<&NodeId>,
    ) -> Result<NodeId, BuildError> {
        let (target_id, target_label) = self.lower_expression(&filter.target)?;
        let (value_id, value_label) =
            self.lower_expression_with_op(&filter.value, Some(filter.op))?;

        let condition = FilterCondition {
            left: FilterOperand::node_ref(target_id.clone(), target_label),
            op: filter.op,
            right: FilterOperand::node_ref(value_id.clone(), value_label),
        };

        let mut inputs = vec![target_id];
        if !inputs.contains(&value_id) {
            inputs.push(value_id);
        }
        if let Some(extra) = extra_input {
            if !inputs.contains(extra) {
                inputs.push(extra.clone());
            }
        }

        Ok(self.graph.add_node(
            NodeKind::Filter(FilterNode { condition }),
            inputs,
            NodeMetadata::default(),
        ))
    }
}
