//! Common test utilities for the proxy
//!
//! Shared fixtures for the integration tests: application state around a
//! scripted backend, wiremock stand-ins for the GitHub/Copilot endpoints, and
//! an SSE body parser.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use copilot_proxy::auth::{AuthError, BearerCredential, SessionCredential, SessionTokenSource};
use copilot_proxy::backend::{ScriptedBackend, SessionBackend};
use copilot_proxy::{build_http_client, routes, AppState, Config};

/// Test configuration constants
pub mod constants {
    pub const TEST_SESSION_TOKEN: &str = "tid=test-session;exp=1";
    pub const TEST_GITHUB_TOKEN: &str = "gho_test_token";
}

/// Token source that always succeeds without touching the network
pub struct StaticTokenSource;

#[async_trait]
impl SessionTokenSource for StaticTokenSource {
    async fn exchange(&self, _bearer: &BearerCredential) -> Result<SessionCredential, AuthError> {
        Ok(SessionCredential {
            token: constants::TEST_SESSION_TOKEN.to_string(),
            expires_at: chrono::Utc::now().timestamp() + 1_800,
        })
    }
}

/// Test server whose requests are answered by `backend`
pub fn scripted_server(backend: ScriptedBackend) -> TestServer {
    scripted_server_with_config(backend, Config::for_testing("http://127.0.0.1:9"))
}

pub fn scripted_server_with_config(backend: ScriptedBackend, config: Config) -> TestServer {
    let backend: Arc<dyn SessionBackend> = Arc::new(backend);
    let state = Arc::new(AppState::new_for_testing(
        config,
        backend,
        Arc::new(StaticTokenSource),
    ));
    TestServer::new(routes::create_router(state)).expect("Failed to create test server")
}

/// Test server wired to the real Copilot backend, pointed at `mock`
pub fn copilot_server(mock: &MockServer) -> TestServer {
    copilot_server_with_config(Config::for_testing(&mock.uri()))
}

/// Test server wired to the real Copilot backend with a caller-tuned config
pub fn copilot_server_with_config(config: Config) -> TestServer {
    let http_client = build_http_client(&config).expect("Failed to build HTTP client");
    let state = AppState::new(
        config,
        BearerCredential::new(constants::TEST_GITHUB_TOKEN),
        http_client,
    );
    TestServer::new(routes::create_router(Arc::new(state))).expect("Failed to create test server")
}

/// Mock GitHub/Copilot endpoints
pub mod copilot_mocks {
    use super::*;

    /// Session-token exchange answering with a token valid for 30 minutes
    pub async fn mock_token_exchange(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/copilot_internal/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": constants::TEST_SESSION_TOKEN,
                "expires_at": chrono::Utc::now().timestamp() + 1_800,
                "refresh_in": 1_500
            })))
            .mount(server)
            .await;
    }

    /// Chat endpoint streaming `chunks` as OpenAI deltas, then `[DONE]`
    pub async fn mock_chat_stream(server: &MockServer, chunks: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(openai_sse(chunks), "text/event-stream"),
            )
            .mount(server)
            .await;
    }

    pub fn openai_sse(chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str(&format!(
                "data: {}\n\n",
                json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion.chunk",
                    "choices": [{"index": 0, "delta": {"content": chunk}, "finish_reason": null}]
                })
            ));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }
}

/// A minimal non-streaming request body
pub fn simple_request(content: &str) -> Value {
    json!({
        "model": "gpt-5-mini",
        "max_tokens": 256,
        "messages": [{"role": "user", "content": content}]
    })
}

/// Split an Anthropic SSE body into `(event, data)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut event = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = Some(name.to_string());
                } else if let Some(payload) = line.strip_prefix("data: ") {
                    data = Some(serde_json::from_str(payload).expect("frame data is JSON"));
                }
            }
            (
                event.expect("frame has an event line"),
                data.expect("frame has a data line"),
            )
        })
        .collect()
}

pub fn event_names(frames: &[(String, Value)]) -> Vec<&str> {
    frames.iter().map(|(name, _)| name.as_str()).collect()
}
