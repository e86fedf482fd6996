use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::compiler::{self, CompileError, CompileOptions};
use crate::screener_query::validation::{validate_user_query, ValidationIssue};

use super::models::{
    CompileRequest, CompileResponse, ErrorResponse, HealthResponse, QuerySummary,
};
use super::AppState;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /compile`: validate the query, run the pipeline, return SQL,
/// parameters, and the graph diagram. The body is read raw so malformed
/// JSON maps to 400 and schema failures to 422 with a details list.
pub async fn compile_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: CompileRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            log::debug!("Rejected malformed compile request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "bad_request",
                    format!("Invalid JSON body: {}", e),
                )),
            )
                .into_response();
        }
    };

    let issues = validate_user_query(&request.query, &state.screener_config);
    if !issues.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::with_details(
                "validation_failed",
                "Query failed validation",
                issues,
            )),
        )
            .into_response();
    }

    let options = CompileOptions {
        risky_optimizations: request.options.risky_optimizations,
    };
    match compiler::compile(&request.query, &state.screener_config, options) {
        Ok(result) => (
            StatusCode::OK,
            Json(CompileResponse {
                success: true,
                query: QuerySummary {
                    id: request.query.id.clone(),
                    name: request.query.name.clone(),
                },
                graph: result.diagram,
                sql: result.sql,
            }),
        )
            .into_response(),
        Err(CompileError::Build(e)) => {
            // Build errors are query problems (unknown metric, bad grouping
            // dimension); surface them like validation failures.
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse::with_details(
                    "validation_failed",
                    "Query references unknown configuration",
                    vec![ValidationIssue {
                        path: "filter".to_string(),
                        message: e.to_string(),
                    }],
                )),
            )
                .into_response()
        }
        Err(e) => {
            log::error!("Compile pipeline failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", e.to_string())),
            )
                .into_response()
        }
    }
}

pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("not_found", "No such route")),
    )
        .into_response()
}
