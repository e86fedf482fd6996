//! HTTP surface: a health probe and the compile endpoint.
//!
//! Thin glue over the compiler — requests are validated, compiled, and
//! answered; no state outlives a request except the read-only configs in
//! [`AppState`]. Every response carries an `x-request-id` header and a
//! timing header.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use uuid::Uuid;

use crate::config::{default_config, ScreenerConfig, ServerConfig};

pub mod handlers;
pub mod models;

use handlers::{compile_handler, health_check, not_found};
use models::ErrorResponse;

pub struct AppState {
    pub screener_config: Arc<ScreenerConfig>,
    pub config: ServerConfig,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let body_limit = state.config.max_body_bytes;
    // Layers wrap outward: panics are caught closest to the handlers, the
    // request-id middleware sits outermost so every response carries it.
    Router::new()
        .route("/health", get(health_check))
        .route("/compile", post(compile_handler))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(|_: Box<dyn std::any::Any + Send>| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", "Unhandled panic")),
            )
                .into_response()
        }))
        .layer(TimeoutLayer::new(timeout))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(middleware::from_fn(request_context))
        .with_state(state)
}

/// Attach a request id and latency header to every response.
async fn request_context(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.3}", elapsed_ms)) {
        response.headers_mut().insert("x-response-time-ms", value);
    }
    log::info!(
        "{} {} -> {} ({:.3}ms) [{}]",
        method,
        path,
        response.status(),
        elapsed_ms,
        request_id
    );
    response
}

pub async fn run() {
    dotenv().ok();
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    run_with_config(config).await;
}

pub async fn run_with_config(config: ServerConfig) {
    dotenv().ok();

    let screener_config = match &config.screener_config_path {
        Some(path) => match ScreenerConfig::from_yaml_file(path) {
            Ok(loaded) => {
                log::info!("Loaded screener config from {}", path);
                loaded
            }
            Err(e) => {
                log::error!("Failed to load screener config from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            log::info!("Using built-in market-data screener config");
            default_config().clone()
        }
    };

    let bind_address = format!("{}:{}", config.http_host, config.http_port);
    let state = Arc::new(AppState {
        screener_config: Arc::new(screener_config),
        config,
    });
    let app = build_router(state);

    log::info!("Starting HTTP server on {}", bind_address);
    let listener = match TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind HTTP listener to {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        log::error!("HTTP server error: {}", e);
        std::process::exit(1);
    }
}
