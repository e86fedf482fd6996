//! Compute node taxonomy.
//!
//! Nodes refer to each other by [`NodeId`] only, never by reference. The
//! graph owns every node in an id-keyed map, which lets rewrites mutate in
//! place and makes `replace_node_id` a plain scan.

use serde::Serialize;

use crate::screener_query::{Expression, FilterOp, LogicalOperator, SortDirection};

pub type NodeId = String;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputeNode {
    pub id: NodeId,
    pub inputs: Vec<NodeId>,
    /// True iff no other node consumes this one.
    pub is_terminal: bool,
    #[serde(skip_serializing_if = "NodeMetadata::is_empty")]
    pub metadata: NodeMetadata,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Source(SourceNode),
    Projection(ProjectionNode),
    Expression(ExpressionNode),
    Filter(FilterNode),
    CompositeFilter(CompositeFilterNode),
    Sort(SortNode),
    Limit(LimitNode),
    Join(JoinNode),
}

impl NodeKind {
    /// Prefix of generated node ids (`filter_1`, `projection_2`, ...).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            NodeKind::Source(_) => "source",
            NodeKind::Projection(_) => "projection",
            NodeKind::Expression(_) => "expression",
            NodeKind::Filter(_) => "filter",
            NodeKind::CompositeFilter(_) => "composite_filter",
            NodeKind::Sort(_) => "sort",
            NodeKind::Limit(_) => "limit",
            NodeKind::Join(_) => "join",
        }
    }

    pub fn is_filterish(&self) -> bool {
        matches!(self, NodeKind::Filter(_) | NodeKind::CompositeFilter(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceNode {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionNode {
    pub columns: Vec<ProjectionColumn>,
}

/// One projected column: either a named table column or an inline
/// expression, each optionally aliased.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ProjectionColumn {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_node: Option<NodeId>,
}

impl ProjectionColumn {
    pub fn named(name: impl Into<String>, source_node: NodeId) -> Self {
        Self {
            name: Some(name.into()),
            source_node: Some(source_node),
            ..Default::default()
        }
    }

    /// Name the column exposes to downstream scopes.
    pub fn output_name(&self) -> Option<&str> {
        self.alias.as_deref().or(self.name.as_deref())
    }

    /// Stable key used when comparing projections for deduplication.
    pub fn fingerprint(&self) -> String {
        match (&self.name, &self.expression) {
            (Some(name), _) => format!("col:{}:{}", name, self.alias.as_deref().unwrap_or("")),
            (None, Some(expr)) => format!(
                "expr:{}:{}",
                serde_json::to_string(expr).unwrap_or_default(),
                self.alias.as_deref().unwrap_or("")
            ),
            (None, None) => String::from("empty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionNode {
    pub expression: Expression,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// For lowered constants: the inlined literal or `{param_n: Type}`
    /// placeholder this node stands for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterNode {
    pub condition: FilterCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterCondition {
    pub left: FilterOperand,
    pub op: FilterOp,
    pub right: FilterOperand,
}

/// One side of a filter condition. At least one side of every condition
/// names a node input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterOperand {
    NodeRef {
        input: NodeId,
        #[serde(skip_serializing_if = "Option::is_none")]
        metric: Option<String>,
    },
    Parameter {
        parameter: String,
    },
    Literal(Expression),
}

impl FilterOperand {
    pub fn node_ref(input: NodeId, metric: Option<String>) -> Self {
        FilterOperand::NodeRef { input, metric }
    }

    pub fn input(&self) -> Option<&NodeId> {
        match self {
            FilterOperand::NodeRef { input, .. } => Some(input),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeFilterNode {
    pub operator: LogicalOperator,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortNode {
    pub criteria: Vec<SortCriterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortCriterion {
    pub key: SortKey,
    pub direction: SortDirection,
}

/// Sort key: a node reference, or raw SQL text once parameter inlining has
/// replaced the node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SortKey {
    Node(NodeId),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitNode {
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinNode {
    pub join_type: JoinType,
    pub conditions: Vec<JoinCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinCondition {
    pub left: JoinKey,
    pub right: JoinKey,
    pub op: FilterOp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinKey {
    pub node: NodeId,
    pub table: String,
    pub column: String,
}

/// Optional per-node annotations read by the optimizer and SQL planner.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct NodeMetadata {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_parameter: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub has_parameter: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_grouping: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_required_projection: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_grouped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_dimension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl NodeMetadata {
    pub fn is_empty(&self) -> bool {
        self == &NodeMetadata::default()
    }
}
