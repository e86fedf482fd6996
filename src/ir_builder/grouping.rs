//! Grouping lowering.
//!
//! Plain dimensions become grouping projections. Top-N-per-group becomes a
//! sort + limit pair tagged with the group dimension; the SQL emitter turns
//! that pair into `LIMIT n BY <dimension>`.

use crate::compute_graph::{
    LimitNode, NodeId, NodeKind, NodeMetadata, ProjectionColumn, ProjectionNode, SortCriterion,
    SortKey, SortNode,
};
use crate::screener_query::{GroupingCriterion, TopNGrouping};

use super::{BuildError, IrBuilder};

impl<'a> IrBuilder<'a> {
    pub(super) fn lower_grouping(
        &mut self,
        criterion: &GroupingCriterion,
    ) -> Result<(), BuildError> {
        match criterion {
            GroupingCriterion::Dimension(name) => {
                self.lower_dimension(name)?;
                Ok(())
            }
            GroupingCriterion::TopN(top_n) => self.lower_top_n(top_n),
        }
    }

    fn lower_top_n(&mut self, top_n: &TopNGrouping) -> Result<(), BuildError> {
        let dimension_id = self.lower_dimension(&top_n.dimension)?;

        let order_id = match &top_n.expression {
            Some(expr) => self.lower_expression(expr)?.0,
            None => dimension_id,
        };

        let metadata = NodeMetadata {
            is_grouped: true,
            group_dimension: Some(top_n.dimension.clone()),
            group_limit: Some(top_n.limit),
            ..Default::default()
        };

        let sort_id = self.graph.add_node(
            NodeKind::Sort(SortNode {
                criteria: vec![SortCriterion {
                    key: SortKey::Node(order_id.clone()),
                    direction: top_n.direction.unwrap_or_default(),
                }],
            }),
            vec![order_id],
            metadata.clone(),
        );

        self.graph.add_node(
            NodeKind::Limit(LimitNode { limit: top_n.limit }),
            vec![sort_id],
            metadata,
        );
        Ok(())
    }

    fn lower_dimension(&mut self, name: &str) -> Result<NodeId, BuildError> {
        let mapping = self
            .config
            .resolve_metric(name)
            .ok_or_else(|| BuildError::GroupingDimensionNotFound(name.to_string()))?;
        let table = mapping.table.clone();
        let column = mapping.column.clone();

        let source_id = self.find_or_create_source(&table);
        Ok(self.graph.add_node(
            NodeKind::Projection(ProjectionNode {
                columns: vec![ProjectionColumn {
                    name: Some(column),
                    expression: None,
                    alias: None,
                    source_node: Some(source_id.clone()),
                }],
            }),
            vec![source_id],
            NodeMetadata {
                is_grouping: true,
                ..Default::default()
            },
        ))
    }
}
