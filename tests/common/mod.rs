#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use flame_edge::{
    AppConfig, EdgeApplicationServer,
    server::services::{DynRateLimitService, edge_services::EdgeServices},
};

pub const TEST_USER_AGENT: &str = "flame-edge-tests/1.0";

/// router backed by process local storage, the same shape the server runs without redis
pub fn test_app(config: AppConfig) -> Router {
    let services = EdgeServices::new(None, Arc::new(config)).unwrap();
    EdgeApplicationServer::router(services, None)
}

/// same as `test_app` with the rate limiter swapped out
pub fn test_app_with_rate_limit(config: AppConfig, rate_limit: DynRateLimitService) -> Router {
    let mut services = EdgeServices::new(None, Arc::new(config)).unwrap();
    services.rate_limit = rate_limit;
    EdgeApplicationServer::router(services, None)
}

pub fn default_app() -> Router {
    test_app(AppConfig::default())
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::USER_AGENT, TEST_USER_AGENT)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::USER_AGENT, TEST_USER_AGENT)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
