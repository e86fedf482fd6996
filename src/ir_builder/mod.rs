//! Lowers a [`UserQuery`] into the compute graph.
//!
//! Build order: the filter tree first, then each grouping criterion, then
//! the sort criteria, then a terminal limit node; join inference runs once
//! all sources are known, and the required-columns pass finishes the graph.
//! Constants allocate their parameter slots during lowering, which is what
//! gives the parameter map its encounter order.

use indexmap::IndexMap;

use crate::compute_graph::{
    ComputeGraph, LimitNode, NodeId, NodeKind, NodeMetadata, SortCriterion, SortKey, SortNode,
};
use crate::config::ScreenerConfig;
use crate::screener_query::{SortSpec, UserQuery};

pub mod errors;
mod expression_lowering;
mod filter_lowering;
mod grouping;
mod join_inference;
pub mod parameters;
mod required_columns;

pub use errors::BuildError;
pub use parameters::{ParameterError, ParameterTable};
pub use required_columns::add_required_columns;

/// Output of lowering: the raw graph plus the parameter slots allocated
/// while walking the query.
#[derive(Debug)]
pub struct LoweredQuery {
    pub graph: ComputeGraph,
    pub params: ParameterTable,
}

pub struct IrBuilder<'a> {
    config: &'a ScreenerConfig,
    graph: ComputeGraph,
    params: ParameterTable,
    /// table name → source node, so every metric on a table shares one scan
    table_sources: IndexMap<String, NodeId>,
}

impl<'a> IrBuilder<'a> {
    pub fn new(config: &'a ScreenerConfig) -> Self {
        Self {
            config,
            graph: ComputeGraph::new(),
            params: ParameterTable::new(),
            table_sources: IndexMap::new(),
        }
    }

    pub fn build(mut self, query: &UserQuery) -> Result<LoweredQuery, BuildError> {
        self.lower_filter(&query.filter, None)?;

        if let Some(groups) = &query.group_by {
            for criterion in groups {
                self.lower_grouping(criterion)?;
            }
        }

        let sort_id = match &query.sort_by {
            Some(specs) if !specs.is_empty() => Some(self.lower_sort(specs)?),
            _ => None,
        };

        if let Some(limit) = query.limit {
            let inputs: Vec<NodeId> = sort_id.into_iter().collect();
            self.graph.add_node(
                NodeKind::Limit(LimitNode { limit }),
                inputs,
                NodeMetadata::default(),
            );
        }

        join_inference::infer_join(&mut self.graph, self.config)?;
        required_columns::add_required_columns(&mut self.graph, self.config);

        log::debug!(
            "Lowered query '{}' into {} nodes, {} parameters",
            query.id,
            self.graph.len(),
            self.params.len()
        );

        Ok(LoweredQuery {
            graph: self.graph,
            params: self.params,
        })
    }

    /// One sort node carrying every criterion; inputs are the deduplicated
    /// sort-expression nodes, criteria preserve user order.
    fn lower_sort(&mut self, specs: &[SortSpec]) -> Result<NodeId, BuildError> {
        let mut inputs: Vec<NodeId> = Vec::new();
        let mut criteria = Vec::with_capacity(specs.len());
        for spec in specs {
            let (id, _) = self.lower_expression(&spec.target)?;
            criteria.push(SortCriterion {
                key: SortKey::Node(id.clone()),
                direction: spec.direction,
            });
            if !inputs.contains(&id) {
                inputs.push(id);
            }
        }
        Ok(self.graph.add_node(
            NodeKind::Sort(SortNode { criteria }),
            inputs,
            NodeMetadata::default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_graph::NodeKind;
    use crate::config::default_config;
    use crate::screener_query::UserQuery;

    fn build(query_json: &str) -> LoweredQuery {
        let query: UserQuery = serde_json::from_str(query_json).unwrap();
        IrBuilder::new(default_config()).build(&query).unwrap()
    }

    #[test]
    fn test_simple_filter_graph_shape() {
        let lowered = build(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {"target": {"metric": "sector"}, "op": "eq", "value": "Technology"},
                "limit": 100
            }"#,
        );
        let graph = &lowered.graph;

        // One source, the sector projection, the parameter expression, the
        // filter, and the terminal limit.
        assert_eq!(graph.source_ids().len(), 1);
        assert!(graph.contains("filter_1"));
        assert!(graph.contains("limit_1"));
        let filter = graph.node("filter_1").unwrap();
        assert_eq!(filter.inputs.len(), 2);

        assert_eq!(lowered.params.len(), 1);
        assert_eq!(
            lowered.params.values()["param_1"],
            serde_json::json!("Technology")
        );
    }

    #[test]
    fn test_unknown_metric_fails() {
        let query: UserQuery = serde_json::from_str(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {"target": {"metric": "bogus"}, "op": "eq", "value": 1}
            }"#,
        )
        .unwrap();
        let err = IrBuilder::new(default_config()).build(&query).unwrap_err();
        assert_eq!(err, BuildError::UnknownMetric("bogus".to_string()));
    }

    #[test]
    fn test_two_tables_get_joined() {
        let lowered = build(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {"operator": "and", "filters": [
                    {"target": {"metric": "sector"}, "op": "eq", "value": "Tech"},
                    {"target": {"metric": "close"}, "op": "gt", "value": 10}
                ]}
            }"#,
        );
        let graph = &lowered.graph;
        assert_eq!(graph.source_ids().len(), 2);
        let joins: Vec<_> = graph
            .nodes()
            .filter(|n| matches!(n.kind, NodeKind::Join(_)))
            .collect();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].inputs.len(), 2);

        // Projections were rewired onto the join.
        let join_id = joins[0].id.clone();
        for node in graph.nodes() {
            if let NodeKind::Projection(_) = node.kind {
                if !node.metadata.is_required_projection {
                    assert_eq!(node.inputs, vec![join_id.clone()]);
                }
            }
        }
    }

    #[test]
    fn test_aggregate_gets_auto_alias() {
        let lowered = build(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {
                    "target": {"target": {"metric": "close"}, "aggregation": "avg",
                               "time_range": {"type": "relative", "duration": 30, "unit": "day"}},
                    "op": "gt", "value": 100
                }
            }"#,
        );
        let aggregate = lowered
            .graph
            .nodes()
            .find_map(|n| match &n.kind {
                NodeKind::Expression(e) if !n.metadata.is_parameter => Some(e.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(aggregate.alias.as_deref(), Some("avg_close_30d"));
    }

    #[test]
    fn test_required_columns_added_for_time_window() {
        let lowered = build(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {
                    "target": {"target": {"metric": "close"}, "aggregation": "avg",
                               "time_range": {"type": "relative", "duration": 30, "unit": "day"}},
                    "op": "gt", "value": 100
                }
            }"#,
        );
        let required: Vec<String> = lowered
            .graph
            .nodes()
            .filter(|n| n.metadata.is_required_projection)
            .filter_map(|n| match &n.kind {
                NodeKind::Projection(p) => p.columns[0].name.clone(),
                _ => None,
            })
            .collect();
        assert!(required.contains(&"ticker".to_string()));
        assert!(required.contains(&"date".to_string()));
    }

    #[test]
    fn test_top_n_grouping_emits_sort_and_limit_pair() {
        let lowered = build(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {"target": {"metric": "sector"}, "op": "eq", "value": "Tech"},
                "group_by": [{"dimension": "sector", "limit": 3}]
            }"#,
        );
        let graph = &lowered.graph;
        let sort = graph
            .nodes()
            .find(|n| matches!(n.kind, NodeKind::Sort(_)))
            .unwrap();
        assert!(sort.metadata.is_grouped);
        assert_eq!(sort.metadata.group_dimension.as_deref(), Some("sector"));
        assert_eq!(sort.metadata.group_limit, Some(3));

        let limit = graph
            .nodes()
            .find(|n| matches!(n.kind, NodeKind::Limit(_)))
            .unwrap();
        assert!(limit.metadata.is_grouped);
        assert_eq!(limit.metadata.group_dimension.as_deref(), Some("sector"));
    }
}
