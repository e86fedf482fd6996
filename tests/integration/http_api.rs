//! HTTP surface tests driven through the router with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use screenhouse::config::{default_config, ServerConfig};
use screenhouse::server::{build_router, AppState};

fn test_router() -> axum::Router {
    build_router(Arc::new(AppState {
        screener_config: Arc::new(default_config().clone()),
        config: ServerConfig::default(),
    }))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_compile(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/compile")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok_with_request_id() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn compile_returns_sql_and_diagram() {
    let request_body = json!({
        "id": "http-1", "name": "tech", "status": "active",
        "filter": {"target": {"metric": "sector"}, "op": "eq", "value": "Technology"},
        "limit": 10
    });
    let response = test_router()
        .oneshot(post_compile(request_body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["query"]["id"], "http-1");
    assert_eq!(body["query"]["name"], "tech");
    assert!(body["graph"].as_str().unwrap().starts_with("graph TD;"));
    assert!(body["sql"]["query"]
        .as_str()
        .unwrap()
        .contains("{param_1: String}"));
    assert_eq!(body["sql"]["parameters"]["param_1"], "Technology");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let response = test_router()
        .oneshot(post_compile("{not json".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn schema_violations_are_unprocessable_with_details() {
    let request_body = json!({
        "id": "", "name": "bad", "status": "active",
        "filter": {"target": {"metric": "sector"}, "op": "eq", "value": "Tech"},
        "limit": 0
    });
    let response = test_router()
        .oneshot(post_compile(request_body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "validation_failed");
    let details = body["error"]["details"].as_array().unwrap();
    let paths: Vec<&str> = details
        .iter()
        .map(|d| d["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"id"));
    assert!(paths.contains(&"limit"));
}

#[tokio::test]
async fn unknown_metric_is_reported() {
    let request_body = json!({
        "id": "http-2", "name": "bad metric", "status": "active",
        "filter": {"target": {"metric": "not_a_metric"}, "op": "eq", "value": 1}
    });
    let response = test_router()
        .oneshot(post_compile(request_body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert!(body["error"]["details"][0]["message"]
        .as_str()
        .unwrap()
        .contains("not_a_metric"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "not_found");
}
