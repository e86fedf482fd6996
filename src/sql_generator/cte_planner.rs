//! CTE planning: partition the graph into CTE groups and a main scope.
//!
//! A node seeds a group when materializing it pays off: fan-out greater
//! than one for structural nodes, windowed or multi-input expressions, or
//! a filter that can ride along with its projection. Each group then
//! absorbs its transitive inputs and the downstream nodes listed in the
//! absorption rules; nodes claimed by an earlier group become a group
//! reference instead.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::compute_graph::{ComputeGraph, NodeId, NodeKind};
use crate::screener_query::Expression;

use super::errors::SqlError;
use super::time_window::distinct_time_range_count;

#[derive(Debug, Clone, Default)]
pub struct CteGroup {
    /// Member nodes in execution order.
    pub nodes: Vec<NodeId>,
    /// Indices of earlier groups this one reads from.
    pub depends_on: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct CtePlan {
    pub groups: Vec<CteGroup>,
    /// Ungrouped nodes, in execution order. These emit in the main SELECT.
    pub main_nodes: Vec<NodeId>,
}

impl CtePlan {
    /// Groups no other group reads from; the main SELECT consumes these.
    pub fn root_groups(&self) -> Vec<usize> {
        let referenced: HashSet<usize> = self
            .groups
            .iter()
            .flat_map(|g| g.depends_on.iter().copied())
            .collect();
        (0..self.groups.len())
            .filter(|i| !referenced.contains(i))
            .collect()
    }
}

pub fn plan(graph: &ComputeGraph) -> Result<CtePlan, SqlError> {
    let order = graph.execution_order()?;
    let position: HashMap<&NodeId, usize> =
        order.iter().enumerate().map(|(i, id)| (id, i)).collect();
    let distinct_ranges = distinct_time_range_count(graph);

    let mut assignment: HashMap<NodeId, usize> = HashMap::new();
    let mut groups: Vec<CteGroup> = Vec::new();

    for seed in order.iter().filter(|id| is_seed(graph, id, distinct_ranges)) {
        if assignment.contains_key(seed.as_str()) {
            continue;
        }
        let group_index = groups.len();
        let mut members: HashSet<NodeId> = HashSet::new();
        let mut depends: BTreeSet<usize> = BTreeSet::new();

        claim(graph, seed, &assignment, &mut members, &mut depends);
        absorb(graph, &assignment, &mut members, &mut depends);

        let mut ordered: Vec<NodeId> = members.iter().cloned().collect();
        ordered.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
        for member in &ordered {
            assignment.insert(member.clone(), group_index);
        }
        groups.push(CteGroup {
            nodes: ordered,
            depends_on: depends.into_iter().collect(),
        });
    }

    let main_nodes: Vec<NodeId> = order
        .iter()
        .filter(|id| !assignment.contains_key(id.as_str()))
        .cloned()
        .collect();

    Ok(prune_degenerate_aliases(CtePlan { groups, main_nodes }))
}

/// Add a node and its transitive inputs; inputs owned by an earlier group
/// become a group reference.
fn claim(
    graph: &ComputeGraph,
    id: &str,
    assignment: &HashMap<NodeId, usize>,
    members: &mut HashSet<NodeId>,
    depends: &mut BTreeSet<usize>,
) {
    if let Some(owner) = assignment.get(id) {
        depends.insert(*owner);
        return;
    }
    if !members.insert(id.to_string()) {
        return;
    }
    if let Some(node) = graph.node(id) {
        for input in &node.inputs {
            claim(graph, input, assignment, members, depends);
        }
    }
}

/// Downstream absorption to a fixpoint: single-input pass-through nodes,
/// projections fully fed by the group, and filters fully fed by the group
/// whose dependents are not aggregate expressions.
fn absorb(
    graph: &ComputeGraph,
    assignment: &HashMap<NodeId, usize>,
    members: &mut HashSet<NodeId>,
    depends: &mut BTreeSet<usize>,
) {
    loop {
        let mut added: Vec<NodeId> = Vec::new();
        for node in graph.nodes() {
            if members.contains(&node.id) || assignment.contains_key(&node.id) {
                continue;
            }
            let all_inputs_inside =
                !node.inputs.is_empty() && node.inputs.iter().all(|i| members.contains(i));

            let absorbed = match &node.kind {
                NodeKind::Projection(_) => all_inputs_inside,
                NodeKind::Expression(e) => {
                    !node.metadata.is_parameter
                        && !matches!(e.expression, Expression::Metric(_))
                        && node.inputs.len() == 1
                        && members.contains(&node.inputs[0])
                }
                NodeKind::Filter(_) | NodeKind::CompositeFilter(_) => {
                    all_inputs_inside
                        && graph.find_dependents(&node.id).iter().all(|dep| {
                            !matches!(
                                graph.node(dep).map(|d| &d.kind),
                                Some(NodeKind::Expression(e))
                                    if matches!(e.expression, Expression::Aggregate(_))
                            )
                        })
                }
                _ => false,
            };
            if absorbed {
                added.push(node.id.clone());
            }
        }
        if added.is_empty() {
            break;
        }
        for id in added {
            claim(graph, &id, assignment, members, depends);
        }
    }
}

fn is_seed(graph: &ComputeGraph, id: &str, distinct_ranges: usize) -> bool {
    let Some(node) = graph.node(id) else {
        return false;
    };
    match &node.kind {
        NodeKind::Projection(_)
        | NodeKind::Source(_)
        | NodeKind::Join(_)
        | NodeKind::Limit(_)
        | NodeKind::Sort(_) => graph.find_dependents(id).len() > 1,
        NodeKind::Expression(e) if !node.metadata.is_parameter => match &e.expression {
            Expression::Math(_) => node.inputs.len() > 1,
            Expression::Aggregate(agg) => {
                node.inputs.len() > 1
                    || agg
                        .time_range
                        .as_ref()
                        .map(|r| r.is_relative())
                        .unwrap_or(false)
                    || (agg.time_range.is_some() && distinct_ranges >= 2)
            }
            _ => false,
        },
        NodeKind::Filter(_) => {
            node.inputs.len() == 1
                && matches!(
                    graph.node(&node.inputs[0]).map(|n| &n.kind),
                    Some(NodeKind::Projection(_))
                )
        }
        _ => false,
    }
}

/// Drop groups that are nothing but an alias for another group.
fn prune_degenerate_aliases(mut plan: CtePlan) -> CtePlan {
    loop {
        let degenerate = plan
            .groups
            .iter()
            .position(|g| g.nodes.is_empty() && g.depends_on.len() == 1);
        let Some(index) = degenerate else {
            return plan;
        };
        let target = plan.groups[index].depends_on[0];
        plan.groups.remove(index);
        let remap = |i: usize| {
            if i == index {
                target
            } else if i > index {
                i - 1
            } else {
                i
            }
        };
        for group in plan.groups.iter_mut() {
            let mut seen = BTreeSet::new();
            group.depends_on = group
                .depends_on
                .iter()
                .map(|i| remap(*i))
                .filter(|i| seen.insert(*i))
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::ir_builder::IrBuilder;
    use crate::optimizer::optimize;
    use crate::screener_query::UserQuery;

    fn planned(query_json: &str) -> (ComputeGraph, CtePlan) {
        let query: UserQuery = serde_json::from_str(query_json).unwrap();
        let mut lowered = IrBuilder::new(default_config()).build(&query).unwrap();
        optimize(&mut lowered.graph, default_config(), false).unwrap();
        let plan = plan(&lowered.graph).unwrap();
        (lowered.graph, plan)
    }

    #[test]
    fn test_projection_filter_forms_one_group() {
        let (graph, plan) = planned(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {"target": {"metric": "sector"}, "op": "eq", "value": "Technology"},
                "limit": 100
            }"#,
        );
        assert_eq!(plan.groups.len(), 1);
        // source + projection + filter in the group, the limit in main.
        assert_eq!(plan.groups[0].nodes.len(), 3);
        assert_eq!(plan.main_nodes.len(), graph.len() - 3);
    }

    #[test]
    fn test_every_node_is_assigned_exactly_once() {
        let (graph, plan) = planned(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {
                    "target": {"target": {"metric": "close"}, "aggregation": "diff_pct",
                               "time_range": {"type": "relative", "duration": 30, "unit": "day"}},
                    "op": "gt", "value": 10
                },
                "limit": 50
            }"#,
        );
        let mut seen: HashSet<&NodeId> = HashSet::new();
        for group in &plan.groups {
            for id in &group.nodes {
                assert!(seen.insert(id), "node {} assigned twice", id);
            }
        }
        for id in &plan.main_nodes {
            assert!(seen.insert(id), "node {} assigned twice", id);
        }
        assert_eq!(seen.len(), graph.len());
    }

    #[test]
    fn test_windowed_aggregate_lands_in_a_group() {
        let (graph, plan) = planned(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {
                    "target": {"target": {"metric": "close"}, "aggregation": "avg",
                               "time_range": {"type": "relative", "duration": 30, "unit": "day"}},
                    "op": "gt", "value": 100
                }
            }"#,
        );
        let aggregate = graph
            .nodes()
            .find(|n| matches!(&n.kind, NodeKind::Expression(e)
                if matches!(e.expression, Expression::Aggregate(_))))
            .unwrap();
        assert!(plan
            .groups
            .iter()
            .any(|g| g.nodes.contains(&aggregate.id)));
    }
}
