//! Parameter inlining.
//!
//! Folds every `is_parameter` expression node into its dependents: filter
//! condition sides referencing the node become `{parameter}` operands, sort
//! keys become the raw placeholder text. Both condition sides are treated
//! symmetrically — a side becomes a parameter iff its own `input` matches
//! the parameter node.

use crate::compute_graph::{ComputeGraph, FilterOperand, NodeId, NodeKind, SortKey};

use super::graph_pass::{GraphPass, OptimizerResult};

pub struct InlineParameters;

impl GraphPass for InlineParameters {
    fn name(&self) -> &'static str {
        "inline_parameters"
    }

    fn apply(&self, graph: &mut ComputeGraph) -> OptimizerResult<bool> {
        let params: Vec<(NodeId, String)> = graph
            .nodes()
            .filter(|n| n.metadata.is_parameter)
            .filter_map(|n| match &n.kind {
                NodeKind::Expression(e) => {
                    Some((n.id.clone(), e.rendered.clone().unwrap_or_default()))
                }
                _ => None,
            })
            .collect();

        let changed = !params.is_empty();
        for (param_id, placeholder) in params {
            for dep_id in graph.find_dependents(&param_id) {
                let Some(dep) = graph.node_mut(&dep_id) else {
                    continue;
                };
                match &mut dep.kind {
                    NodeKind::Filter(filter) => {
                        fold_operand(&mut filter.condition.left, &param_id, &placeholder);
                        fold_operand(&mut filter.condition.right, &param_id, &placeholder);
                    }
                    NodeKind::Sort(sort) => {
                        for criterion in sort.criteria.iter_mut() {
                            if matches!(&criterion.key, SortKey::Node(id) if id == &param_id) {
                                criterion.key = SortKey::Raw(placeholder.clone());
                            }
                        }
                    }
                    _ => {}
                }
                dep.inputs.retain(|input| input != &param_id);
                dep.metadata.has_parameter = true;
            }
            graph.remove_node(&param_id);
        }
        Ok(changed)
    }
}

fn fold_operand(operand: &mut FilterOperand, param_id: &str, placeholder: &str) {
    if matches!(operand, FilterOperand::NodeRef { input, .. } if input == param_id) {
        *operand = FilterOperand::Parameter {
            parameter: placeholder.to_string(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_graph::{
        ExpressionNode, FilterCondition, FilterNode, NodeMetadata, ProjectionColumn,
        ProjectionNode, SourceNode,
    };
    use crate::screener_query::{ConstantValue, Expression, FilterOp};

    #[test]
    fn test_parameter_folds_into_filter_side() {
        let mut graph = ComputeGraph::new();
        let source = graph.add_node(
            NodeKind::Source(SourceNode {
                table: "tickers".to_string(),
                time_column: None,
            }),
            vec![],
            NodeMetadata::default(),
        );
        let projection = graph.add_node(
            NodeKind::Projection(ProjectionNode {
                columns: vec![ProjectionColumn::named("sector", source.clone())],
            }),
            vec![source],
            NodeMetadata::default(),
        );
        let param = graph.add_node(
            NodeKind::Expression(ExpressionNode {
                expression: Expression::Constant(ConstantValue::String(
                    "Technology".to_string(),
                )),
                alias: None,
                rendered: Some("{param_1: String}".to_string()),
            }),
            vec![],
            NodeMetadata {
                is_parameter: true,
                ..Default::default()
            },
        );
        let filter = graph.add_node(
            NodeKind::Filter(FilterNode {
                condition: FilterCondition {
                    left: FilterOperand::node_ref(projection.clone(), Some("sector".to_string())),
                    op: FilterOp::Eq,
                    right: FilterOperand::node_ref(param.clone(), None),
                },
            }),
            vec![projection.clone(), param.clone()],
            NodeMetadata::default(),
        );

        let changed = InlineParameters.apply(&mut graph).unwrap();
        assert!(changed);
        assert!(!graph.contains(&param));

        let filter_node = graph.node(&filter).unwrap();
        assert_eq!(filter_node.inputs, vec![projection]);
        assert!(filter_node.metadata.has_parameter);
        match &filter_node.kind {
            NodeKind::Filter(f) => {
                // Left side untouched, right side became the placeholder.
                assert!(matches!(f.condition.left, FilterOperand::NodeRef { .. }));
                match &f.condition.right {
                    FilterOperand::Parameter { parameter } => {
                        assert_eq!(parameter, "{param_1: String}");
                    }
                    other => panic!("expected parameter, got {:?}", other),
                }
            }
            other => panic!("expected filter, got {:?}", other),
        }
    }
}
