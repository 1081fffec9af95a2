//! Messages endpoint integration tests
//!
//! POST /v1/messages against the scripted backend: buffered and streamed
//! replies, prompt flattening, model defaulting, and error mapping.

use axum::http::StatusCode;
use copilot_proxy::backend::{ScriptedBackend, SessionEvent};
use copilot_proxy::Config;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{event_names, parse_sse, scripted_server, scripted_server_with_config, simple_request};

#[tokio::test]
async fn test_buffered_reply() {
    let backend = ScriptedBackend::replying(&["Hel", "lo"]);
    let server = scripted_server(backend.clone());

    let response = server.post("/v1/messages").json(&simple_request("Hi")).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(
        json,
        json!({
            "id": "msg_copilot_scripted-1",
            "type": "message",
            "role": "assistant",
            "model": "gpt-5-mini",
            "content": [{"type": "text", "text": "Hello"}],
            "stop_reason": "end_turn",
            "stop_sequence": null,
            "usage": {"input_tokens": 10, "output_tokens": 10}
        })
    );
    assert_eq!(backend.sessions_destroyed(), 1);
}

#[tokio::test]
async fn test_streamed_reply() {
    let backend = ScriptedBackend::replying(&["Hel", "lo"]);
    let server = scripted_server(backend.clone());

    let mut body = simple_request("Hi");
    body["stream"] = json!(true);
    let response = server.post("/v1/messages").json(&body).await;

    response.assert_status_ok();
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "text/event-stream"
    );

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
    assert_eq!(frames[0].1["message"]["id"], "msg_copilot_scripted-1");
    assert_eq!(frames[1].1["delta"]["text"], "Hel");
    assert_eq!(frames[2].1["delta"]["text"], "lo");
    assert_eq!(frames[4].1["delta"]["stop_reason"], "end_turn");
    assert_eq!(backend.sessions_destroyed(), 1);
}

#[tokio::test]
async fn test_prompt_is_flattened() {
    let backend = ScriptedBackend::replying(&["ok"]);
    let server = scripted_server(backend.clone());

    server
        .post("/v1/messages")
        .json(&json!({
            "model": "gpt-4o",
            "system": [{"type": "text", "text": "Be brief."}, {"type": "text", "text": "Be kind."}],
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "A"}, {"type": "text", "text": "B"}]},
                {"role": "assistant", "content": "Sure"},
                {"role": "user", "content": "Thanks"}
            ]
        }))
        .await
        .assert_status_ok();

    assert_eq!(
        backend.prompts(),
        vec!["System: Be brief.\n\nSystem: Be kind.\n\nuser: AB\nassistant: Sure\nuser: Thanks\n".to_string()]
    );
    assert_eq!(backend.models(), vec!["gpt-4o".to_string()]);
}

#[tokio::test]
async fn test_empty_model_uses_default() {
    let backend = ScriptedBackend::replying(&["ok"]);
    let server = scripted_server(backend.clone());

    let response = server
        .post("/v1/messages")
        .json(&json!({"messages": [{"role": "user", "content": "Hi"}]}))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["model"], "gpt-5-mini");
    assert_eq!(backend.models(), vec!["gpt-5-mini".to_string()]);
}

#[tokio::test]
async fn test_malformed_body_is_rejected_without_backend_call() {
    let backend = ScriptedBackend::replying(&["never"]);
    let server = scripted_server(backend.clone());

    let response = server.post("/v1/messages").text("{not json").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert_eq!(backend.sessions_created(), 0);
}

#[tokio::test]
async fn test_wrongly_typed_body_is_rejected() {
    let backend = ScriptedBackend::replying(&["never"]);
    let server = scripted_server(backend.clone());

    let response = server
        .post("/v1/messages")
        .json(&json!({"messages": "not a list"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(backend.sessions_created(), 0);
}

#[tokio::test]
async fn test_session_creation_failure_is_500() {
    let backend = ScriptedBackend::replying(&[]).with_create_error("copilot unavailable");
    let server = scripted_server(backend);

    let response = server.post("/v1/messages").json(&simple_request("Hi")).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = response.json();
    assert_eq!(json["error"]["type"], "api_error");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("copilot unavailable"));
}

#[tokio::test]
async fn test_send_failure_is_500_and_session_destroyed() {
    let backend = ScriptedBackend::replying(&["x"]).with_send_error("rejected");
    let server = scripted_server(backend.clone());

    let mut body = simple_request("Hi");
    body["stream"] = json!(true);
    let response = server.post("/v1/messages").json(&body).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(backend.sessions_destroyed(), 1);
}

#[tokio::test]
async fn test_backend_error_yields_partial_buffered_reply() {
    let backend = ScriptedBackend::new(vec![
        SessionEvent::AssistantText("half an ".into()),
        SessionEvent::AssistantText("answer".into()),
        SessionEvent::Error("connection reset".into()),
    ]);
    let server = scripted_server(backend);

    let response = server.post("/v1/messages").json(&simple_request("Hi")).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["content"][0]["text"], "half an answer");
    assert_eq!(json["stop_reason"], "end_turn");
}

#[tokio::test]
async fn test_backend_error_still_closes_stream() {
    let backend = ScriptedBackend::new(vec![
        SessionEvent::AssistantText("partial".into()),
        SessionEvent::Error("connection reset".into()),
    ]);
    let server = scripted_server(backend);

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
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );
}

#[tokio::test]
async fn test_every_request_gets_its_own_session() {
    let backend = ScriptedBackend::replying(&["ok"]);
    let server = scripted_server(backend.clone());

    for _ in 0..3 {
        server
            .post("/v1/messages")
            .json(&simple_request("Hi"))
            .await
            .assert_status_ok();
    }

    assert_eq!(backend.sessions_created(), 3);
    assert_eq!(backend.sessions_destroyed(), 3);
}

#[tokio::test]
async fn test_response_timeout_returns_partial_reply() {
    // No terminal event: only the timeout can end this exchange.
    let backend = ScriptedBackend::new(vec![SessionEvent::AssistantText("still thinking".into())]);
    let mut config = Config::for_testing("http://127.0.0.1:9");
    config.response_timeout_seconds = 1;
    let server = scripted_server_with_config(backend.clone(), config);

    let response = server.post("/v1/messages").json(&simple_request("Hi")).await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["content"][0]["text"], "still thinking");
    assert_eq!(backend.sessions_destroyed(), 1);
}
