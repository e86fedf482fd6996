//! Graph-level invariants that must hold after every pipeline stage.

use screenhouse::compute_graph::{ComputeGraph, GraphError, NodeKind};
use screenhouse::config::default_config;
use screenhouse::ir_builder::IrBuilder;
use screenhouse::optimizer::optimize;
use screenhouse::screener_query::{Expression, UserQuery};

const WINDOWED_QUERY: &str = r#"{
    "id": "q", "name": "n", "status": "active",
    "filter": {"operator": "and", "filters": [
        {"target": {"metric": "country"}, "op": "eq", "value": "United States"},
        {"target": {"target": {"metric": "close"}, "aggregation": "avg",
                    "time_range": {"type": "relative", "duration": 30, "unit": "day"}},
         "op": "gt", "value": 100}
    ]},
    "sort_by": [{"target": {"metric": "volume"}}],
    "limit": 25
}"#;

fn lowered_graph(optimized: bool) -> ComputeGraph {
    let query: UserQuery = serde_json::from_str(WINDOWED_QUERY).unwrap();
    let mut lowered = IrBuilder::new(default_config()).build(&query).unwrap();
    if optimized {
        optimize(&mut lowered.graph, default_config(), false).unwrap();
    }
    lowered.graph
}

#[test]
fn execution_order_covers_every_node_after_inputs() {
    for optimized in [false, true] {
        let graph = lowered_graph(optimized);
        let order = graph.execution_order().unwrap();
        assert_eq!(order.len(), graph.len());
        for node in graph.nodes() {
            let position = order.iter().position(|id| id == &node.id).unwrap();
            for input in &node.inputs {
                let input_position = order.iter().position(|id| id == input).unwrap();
                assert!(
                    input_position < position,
                    "{} should precede {}",
                    input,
                    node.id
                );
            }
        }
    }
}

#[test]
fn every_referenced_node_exists() {
    for optimized in [false, true] {
        let graph = lowered_graph(optimized);
        for node in graph.nodes() {
            for input in &node.inputs {
                assert!(graph.contains(input), "{} -> missing {}", node.id, input);
            }
        }
    }
}

#[test]
fn terminal_flags_match_dependents() {
    for optimized in [false, true] {
        let graph = lowered_graph(optimized);
        for node in graph.nodes() {
            let has_dependents = !graph.find_dependents(&node.id).is_empty();
            assert_eq!(
                node.is_terminal, !has_dependents,
                "terminal flag wrong on {}",
                node.id
            );
        }
    }
}

#[test]
fn at_most_one_join_and_sources_rewired() {
    let graph = lowered_graph(true);
    let joins: Vec<_> = graph
        .nodes()
        .filter(|n| matches!(n.kind, NodeKind::Join(_)))
        .collect();
    assert_eq!(joins.len(), 1);
    let join_id = &joins[0].id;

    for node in graph.nodes() {
        if let NodeKind::Projection(_) = node.kind {
            if node.metadata.is_required_projection {
                continue;
            }
            assert_eq!(node.inputs, vec![join_id.clone()]);
        }
    }
}

#[test]
fn windowed_aggregates_carry_aliases() {
    for optimized in [false, true] {
        let graph = lowered_graph(optimized);
        for node in graph.nodes() {
            let NodeKind::Expression(expr) = &node.kind else {
                continue;
            };
            let Expression::Aggregate(agg) = &expr.expression else {
                continue;
            };
            if agg.time_range.is_some() {
                assert!(
                    expr.alias.as_deref().map(|a| !a.is_empty()).unwrap_or(false),
                    "windowed aggregate {} is missing an alias",
                    node.id
                );
            }
        }
    }
}

#[test]
fn induced_cycle_is_detected() {
    let mut graph = lowered_graph(true);
    // Pick a projection and make it depend on one of its dependents.
    let projection = graph
        .nodes()
        .find(|n| matches!(n.kind, NodeKind::Projection(_)))
        .map(|n| n.id.clone())
        .unwrap();
    let dependent = graph.find_dependents(&projection)[0].clone();
    graph.node_mut(&projection).unwrap().inputs.push(dependent);

    match graph.execution_order() {
        Err(GraphError::CycleDetected(_)) => {}
        other => panic!("expected CycleDetected, got {:?}", other),
    }
}
