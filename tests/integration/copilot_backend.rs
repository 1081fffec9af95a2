//! End-to-end tests through the real Copilot backend
//!
//! The GitHub token endpoint and the Copilot chat endpoint are both served by
//! wiremock; everything between the router and the HTTP client is real.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use copilot_proxy::Config;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    constants, copilot_mocks, copilot_server, copilot_server_with_config, event_names,
    parse_sse, simple_request,
};

#[tokio::test]
async fn test_buffered_reply_from_copilot() {
    let mock = MockServer::start().await;
    copilot_mocks::mock_token_exchange(&mock).await;
    copilot_mocks::mock_chat_stream(&mock, &["Hello", ", ", "world"]).await;
    let server = copilot_server(&mock);

    let response = server.post("/v1/messages").json(&simple_request("Hi")).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["content"][0]["text"], "Hello, world");
    assert!(json["id"].as_str().unwrap().starts_with("msg_copilot_"));
}

#[tokio::test]
async fn test_streamed_reply_from_copilot() {
    let mock = MockServer::start().await;
    copilot_mocks::mock_token_exchange(&mock).await;
    copilot_mocks::mock_chat_stream(&mock, &["a", "b"]).await;
    let server = copilot_server(&mock);

    let mut body = simple_request("Hi");
    body["stream"] = json!(true);
    let response = server.post("/v1/messages").json(&body).await;

    response.assert_status_ok();
    let frames = parse_sse(&response.text());
    assert_eq!(
        event_names(&frames),
        vec![
            "message_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );
}

#[tokio::test]
async fn test_session_token_is_exchanged_once_and_reused() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/copilot_internal/v2/token"))
        .and(header(
            "authorization",
            format!("token {}", constants::TEST_GITHUB_TOKEN).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": constants::TEST_SESSION_TOKEN,
            "expires_at": chrono::Utc::now().timestamp() + 1_800
        })))
        .expect(1)
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header(
            "authorization",
            format!("Bearer {}", constants::TEST_SESSION_TOKEN).as_str(),
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(copilot_mocks::openai_sse(&["ok"]), "text/event-stream"),
        )
        .expect(2)
        .mount(&mock)
        .await;
    let server = copilot_server(&mock);

    for _ in 0..2 {
        server
            .post("/v1/messages")
            .json(&simple_request("Hi"))
            .await
            .assert_status_ok();
    }

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["session_token"]["cached"], true);
    assert!(health["session_token"].get("token").is_none());
}

#[tokio::test]
async fn test_token_exchange_failure_is_500() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/copilot_internal/v2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&mock)
        .await;
    let server = copilot_server(&mock);

    let response = server.post("/v1/messages").json(&simple_request("Hi")).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>()["error"]["type"], "api_error");
}

#[tokio::test]
async fn test_chat_endpoint_rejection_is_500() {
    let mock = MockServer::start().await;
    copilot_mocks::mock_token_exchange(&mock).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("model not supported"))
        .mount(&mock)
        .await;
    let server = copilot_server(&mock);

    let response = server.post("/v1/messages").json(&simple_request("Hi")).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let message = response.json::<Value>()["error"]["message"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(message.contains("model not supported"));
}

#[tokio::test]
async fn test_response_timeout_covers_stalled_chat_endpoint() {
    let mock = MockServer::start().await;
    copilot_mocks::mock_token_exchange(&mock).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(copilot_mocks::openai_sse(&["late"]), "text/event-stream")
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&mock)
        .await;
    let mut config = Config::for_testing(&mock.uri());
    config.response_timeout_seconds = 1;
    let server = copilot_server_with_config(config);

    let started = Instant::now();
    let response = server.post("/v1/messages").json(&simple_request("Hi")).await;

    assert!(started.elapsed() < Duration::from_secs(3));
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let message = response.json::<Value>()["error"]["message"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(message.contains("Timed out"));
}
