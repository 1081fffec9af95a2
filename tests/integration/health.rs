//! Health endpoint integration tests
//!
//! - GET / - Liveness banner
//! - GET /health - JSON status
//! - GET /metrics - Prometheus exposition

use axum::http::StatusCode;
use copilot_proxy::backend::ScriptedBackend;
use serde_json::Value;

use crate::common::{scripted_server, simple_request};

#[tokio::test]
async fn test_root_liveness_banner() {
    let server = scripted_server(ScriptedBackend::replying(&[]));

    let response = server.get("/").await;

    response.assert_status_ok();
    assert_eq!(response.text(), "Copilot Proxy is running");
}

#[tokio::test]
async fn test_health_reports_token_cache_without_token() {
    let server = scripted_server(ScriptedBackend::replying(&[]));

    let response = server.get("/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["backend"], "scripted");
    assert_eq!(json["session_token"]["cached"], false);
    assert!(json["uptime_seconds"].is_u64());
    assert!(!response.text().contains("tid="));
}

#[tokio::test]
async fn test_metrics_after_a_request() {
    copilot_proxy::routes::metrics::init_metrics();
    let server = scripted_server(ScriptedBackend::replying(&["ok"]));
    server.post("/v1/messages").json(&simple_request("hi")).await.assert_status_ok();

    let response = server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("copilot_proxy_requests_total"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let server = scripted_server(ScriptedBackend::replying(&[]));
    server
        .get("/v1/unknown")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
