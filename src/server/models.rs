use serde::{Deserialize, Serialize};

use crate::screener_query::validation::ValidationIssue;
use crate::screener_query::UserQuery;
use crate::sql_generator::SqlQuery;

/// Body of `POST /compile`: a UserQuery plus compile options.
#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    #[serde(flatten)]
    pub query: UserQuery,
    #[serde(default)]
    pub options: CompileRequestOptions,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CompileRequestOptions {
    /// Enable optimizer rewrites that change the join structure.
    #[serde(default)]
    pub risky_optimizations: bool,
}

#[derive(Debug, Serialize)]
pub struct CompileResponse {
    pub success: bool,
    pub query: QuerySummary,
    /// Mermaid rendering of the optimized compute graph.
    pub graph: String,
    pub sql: SqlQuery,
}

#[derive(Debug, Serialize)]
pub struct QuerySummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationIssue>>,
}

impl ErrorResponse {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: &'static str,
        message: impl Into<String>,
        details: Vec<ValidationIssue>,
    ) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code,
                message: message.into(),
                details: Some(details),
            },
        }
    }
}
