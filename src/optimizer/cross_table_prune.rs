//! Cross-table prune (risky).
//!
//! When exactly two sources exist, one of them is `tickers`, every
//! projection taken from `tickers` projects only the shared `ticker`
//! column, and every filter over those projections references only the
//! `ticker` metric, the join is redundant: `ticker` is present in the
//! other table as well. The pass repoints those filters at a `ticker`
//! projection on the other source and removes the `tickers` scan and the
//! join.

use crate::compute_graph::{
    ComputeGraph, FilterOperand, NodeId, NodeKind, NodeMetadata, ProjectionColumn, ProjectionNode,
};
use crate::config::ScreenerConfig;

use super::graph_pass::{GraphPass, OptimizerResult};

pub struct CrossTablePrune<'a> {
    pub config: &'a ScreenerConfig,
}

impl GraphPass for CrossTablePrune<'_> {
    fn name(&self) -> &'static str {
        "cross_table_prune"
    }

    fn apply(&self, graph: &mut ComputeGraph) -> OptimizerResult<bool> {
        let sources = graph.source_ids();
        if sources.len() != 2 {
            return Ok(false);
        }

        let table_of = |graph: &ComputeGraph, id: &str| -> Option<String> {
            match &graph.node(id)?.kind {
                NodeKind::Source(s) => Some(s.table.clone()),
                _ => None,
            }
        };
        let first = table_of(graph, &sources[0]);
        let (tickers_src, other_src) = match first.as_deref() {
            Some("tickers") => (sources[0].clone(), sources[1].clone()),
            _ if table_of(graph, &sources[1]).as_deref() == Some("tickers") => {
                (sources[1].clone(), sources[0].clone())
            }
            _ => return Ok(false),
        };
        let Some(other_table) = table_of(graph, &other_src) else {
            return Ok(false);
        };

        let Some(pk) = self.config.common_primary_key("tickers", &other_table) else {
            return Ok(false);
        };
        if pk != "ticker" {
            return Ok(false);
        }
        let (Some(tickers_cfg), Some(other_cfg)) =
            (self.config.table("tickers"), self.config.table(&other_table))
        else {
            return Ok(false);
        };

        // Classify projections: ticker-only ones are prune candidates; a
        // projection of any tickers-exclusive column keeps the join alive.
        let mut ticker_projections: Vec<NodeId> = Vec::new();
        let mut reusable: Option<NodeId> = None;
        for node in graph.nodes() {
            let NodeKind::Projection(projection) = &node.kind else {
                continue;
            };
            let names: Vec<&str> = projection
                .columns
                .iter()
                .filter_map(|c| c.name.as_deref())
                .collect();
            if names.is_empty() {
                continue;
            }
            if names.iter().all(|n| *n == pk) {
                if node.inputs == vec![other_src.clone()] {
                    // Already scanned from the surviving table; reuse it.
                    reusable.get_or_insert_with(|| node.id.clone());
                } else {
                    ticker_projections.push(node.id.clone());
                }
                continue;
            }
            let tickers_exclusive = names
                .iter()
                .any(|n| tickers_cfg.has_column(n) && !other_cfg.has_column(n));
            if tickers_exclusive {
                return Ok(false);
            }
        }
        if ticker_projections.is_empty() {
            return Ok(false);
        }

        // Filters over those projections may only talk about `ticker`.
        for node in graph.nodes() {
            let NodeKind::Filter(filter) = &node.kind else {
                continue;
            };
            for side in [&filter.condition.left, &filter.condition.right] {
                if let FilterOperand::NodeRef {
                    input,
                    metric: Some(metric),
                } = side
                {
                    if ticker_projections.contains(input) && metric != "ticker" {
                        return Ok(false);
                    }
                }
            }
        }

        let replacement = reusable.unwrap_or_else(|| {
            graph.add_node(
                NodeKind::Projection(ProjectionNode {
                    columns: vec![ProjectionColumn {
                        name: Some(pk.clone()),
                        expression: None,
                        alias: None,
                        source_node: Some(other_src.clone()),
                    }],
                }),
                vec![other_src.clone()],
                NodeMetadata::default(),
            )
        });

        for projection in &ticker_projections {
            graph.replace_node_id(projection, &replacement, None);
            graph.remove_node(projection);
        }

        let join_id = graph
            .nodes()
            .find(|n| matches!(n.kind, NodeKind::Join(_)))
            .map(|n| n.id.clone());
        if let Some(join_id) = join_id {
            graph.replace_node_id(&join_id, &other_src, None);
            graph.remove_node(&join_id);
        }
        graph.remove_node(&tickers_src);

        log::debug!(
            "Cross-table prune: removed '{}' scan, join rewired onto '{}'",
            tickers_src,
            other_table
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::ir_builder::IrBuilder;
    use crate::screener_query::UserQuery;

    fn lowered(query_json: &str) -> ComputeGraph {
        let query: UserQuery = serde_json::from_str(query_json).unwrap();
        IrBuilder::new(default_config())
            .build(&query)
            .unwrap()
            .graph
    }

    #[test]
    fn test_ticker_only_join_is_pruned() {
        let mut graph = lowered(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {"operator": "and", "filters": [
                    {"target": {"metric": "ticker"}, "op": "in", "value": ["AAPL", "MSFT"]},
                    {"target": {"metric": "close"}, "op": "gt", "value": 10}
                ]}
            }"#,
        );
        assert_eq!(graph.source_ids().len(), 2);

        let pass = CrossTablePrune {
            config: default_config(),
        };
        assert!(pass.apply(&mut graph).unwrap());

        assert_eq!(graph.source_ids().len(), 1);
        assert!(!graph.nodes().any(|n| matches!(n.kind, NodeKind::Join(_))));
        assert!(!graph
            .nodes()
            .any(|n| matches!(&n.kind, NodeKind::Source(s) if s.table == "tickers")));
    }

    #[test]
    fn test_sector_filter_blocks_prune() {
        let mut graph = lowered(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {"operator": "and", "filters": [
                    {"target": {"metric": "sector"}, "op": "eq", "value": "Tech"},
                    {"target": {"metric": "close"}, "op": "gt", "value": 10}
                ]}
            }"#,
        );
        let pass = CrossTablePrune {
            config: default_config(),
        };
        assert!(!pass.apply(&mut graph).unwrap());
        assert_eq!(graph.source_ids().len(), 2);
    }
}
