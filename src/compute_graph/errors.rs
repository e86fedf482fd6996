use thiserror::Error;

use super::node::NodeId;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    #[error("Cycle detected at node '{0}' while computing execution order")]
    CycleDetected(NodeId),

    #[error("Node '{node}' references missing input '{input}'")]
    DanglingReference { node: NodeId, input: NodeId },
}
