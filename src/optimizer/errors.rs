use thiserror::Error;

use crate::compute_graph::GraphError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OptimizerError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}
