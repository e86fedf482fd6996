use thiserror::Error;

use super::parameters::ParameterError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("Unknown metric '{0}' (check column mappings)")]
    UnknownMetric(String),

    #[error("Grouping dimension '{0}' not found (check column mappings)")]
    GroupingDimensionNotFound(String),

    #[error("No common primary key between tables '{0}' and '{1}'")]
    NoCommonPrimaryKey(String, String),

    #[error(transparent)]
    Parameter(#[from] ParameterError),
}
