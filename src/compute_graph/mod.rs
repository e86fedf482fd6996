//! Compute graph: the typed DAG the compiler pipeline operates on.
//!
//! Ownership model: the graph owns every node in an insertion-ordered,
//! id-keyed map. Ids are deterministic (`<type>_<counter>` with per-type
//! counters) so rewrites and tests can pin against textual ids. Counter
//! values are never reused, even after `remove_node`.

use std::collections::HashMap;

use indexmap::IndexMap;

pub mod errors;
pub mod node;

pub use errors::GraphError;
pub use node::{
    ComputeNode, CompositeFilterNode, ExpressionNode, FilterCondition, FilterNode, FilterOperand,
    JoinCondition, JoinKey, JoinNode, LimitNode, NodeId, NodeKind, NodeMetadata, ProjectionColumn,
    ProjectionNode, SortCriterion, SortKey, SortNode, SourceNode,
};

#[derive(Debug, Clone, Default)]
pub struct ComputeGraph {
    nodes: IndexMap<NodeId, ComputeNode>,
    counters: HashMap<&'static str, u32>,
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    Active,
    Done,
}

impl ComputeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, assign its id, and mark each input as no longer
    /// terminal. The new node starts terminal.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        inputs: Vec<NodeId>,
        metadata: NodeMetadata,
    ) -> NodeId {
        let counter = self.counters.entry(kind.id_prefix()).or_insert(0);
        *counter += 1;
        let id = format!("{}_{}", kind.id_prefix(), counter);

        for input in &inputs {
            if let Some(node) = self.nodes.get_mut(input) {
                node.is_terminal = false;
            }
        }

        self.nodes.insert(
            id.clone(),
            ComputeNode {
                id: id.clone(),
                inputs,
                is_terminal: true,
                metadata,
                kind,
            },
        );
        id
    }

    /// Remove a node; former inputs become terminal again iff nothing else
    /// references them.
    pub fn remove_node(&mut self, id: &str) -> Option<ComputeNode> {
        let removed = self.nodes.shift_remove(id)?;
        for input in &removed.inputs {
            if self.nodes.contains_key(input) && self.find_dependents(input).is_empty() {
                if let Some(node) = self.nodes.get_mut(input) {
                    node.is_terminal = true;
                }
            }
        }
        Some(removed)
    }

    pub fn node(&self, id: &str) -> Option<&ComputeNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut ComputeNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in insertion order. Every pipeline stage iterates in this
    /// order so optimizer output and SQL are stable.
    pub fn nodes(&self) -> impl Iterator<Item = &ComputeNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of source nodes, in insertion order.
    pub fn source_ids(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::Source(_)))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Nodes whose `inputs` contain `id`, in insertion order.
    pub fn find_dependents(&self, id: &str) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.inputs.iter().any(|input| input == id))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Depth-first post-order topological sort: source nodes first, then a
    /// sweep over the remaining nodes in insertion order. Re-entering a
    /// node on the active path is a cycle.
    pub fn execution_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut state: HashMap<NodeId, VisitState> = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        for id in self.source_ids() {
            self.visit(&id, &mut state, &mut order)?;
        }
        for id in self.nodes.keys() {
            self.visit(id, &mut state, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        id: &str,
        state: &mut HashMap<NodeId, VisitState>,
        order: &mut Vec<NodeId>,
    ) -> Result<(), GraphError> {
        match state.get(id) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::Active) => return Err(GraphError::CycleDetected(id.to_string())),
            None => {}
        }
        state.insert(id.to_string(), VisitState::Active);

        let node = self
            .nodes
            .get(id)
            .expect("visit is only called with ids taken from the node map");
        for input in &node.inputs {
            if !self.nodes.contains_key(input) {
                return Err(GraphError::DanglingReference {
                    node: id.to_string(),
                    input: input.clone(),
                });
            }
            self.visit(input, state, order)?;
        }

        state.insert(id.to_string(), VisitState::Done);
        order.push(id.to_string());
        Ok(())
    }

    /// Rewrite every reference to `old` into `new`: `inputs`, filter
    /// condition sides, sort keys, and projection `source_node` fields.
    /// A filter side that carried a metric keeps it unless `alias`
    /// overrides it. Terminal flags are refreshed for both nodes.
    pub fn replace_node_id(&mut self, old: &str, new: &str, alias: Option<&str>) {
        for node in self.nodes.values_mut() {
            if node.id == new {
                continue;
            }

            if node.inputs.iter().any(|i| i == old) {
                for input in node.inputs.iter_mut() {
                    if input == old {
                        *input = new.to_string();
                    }
                }
                dedup_in_order(&mut node.inputs);
            }

            match &mut node.kind {
                NodeKind::Filter(filter) => {
                    rewrite_operand(&mut filter.condition.left, old, new, alias);
                    rewrite_operand(&mut filter.condition.right, old, new, alias);
                }
                NodeKind::Sort(sort) => {
                    for criterion in sort.criteria.iter_mut() {
                        if let SortKey::Node(id) = &mut criterion.key {
                            if id == old {
                                *id = new.to_string();
                            }
                        }
                    }
                }
                NodeKind::Projection(projection) => {
                    for column in projection.columns.iter_mut() {
                        if column.source_node.as_deref() == Some(old) {
                            column.source_node = Some(new.to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        self.refresh_terminal(new);
        self.refresh_terminal(old);
    }

    fn refresh_terminal(&mut self, id: &str) {
        if !self.nodes.contains_key(id) {
            return;
        }
        let terminal = self.find_dependents(id).is_empty();
        if let Some(node) = self.nodes.get_mut(id) {
            node.is_terminal = terminal;
        }
    }
}

fn rewrite_operand(operand: &mut FilterOperand, old: &str, new: &str, alias: Option<&str>) {
    if let FilterOperand::NodeRef { input, metric } = operand {
        if input == old {
            *input = new.to_string();
            if let Some(alias) = alias {
                *metric = Some(alias.to_string());
            }
        }
    }
}

fn dedup_in_order(ids: &mut Vec<NodeId>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}
