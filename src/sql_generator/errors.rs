use thiserror::Error;

use crate::compute_graph::GraphError;
use crate::ir_builder::ParameterError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("Unknown metric '{0}' reached SQL generation (builder should have rejected it)")]
    UnknownMetric(String),

    #[error("Unsupported aggregation '{0}'")]
    UnsupportedAggregation(String),
}
