//! Anthropic Messages endpoint
//!
//! `POST /v1/messages` flattens the conversation into one prompt, runs it
//! through a fresh backend session, and answers with either a single JSON
//! message or an SSE frame stream depending on `stream`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, info};

use crate::{
    error::{AppError, AppResult},
    messages::{normalize, Exchange, MessagesRequest},
    AppState,
};

/// Handle `POST /v1/messages`
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Response> {
    let request: MessagesRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;

    let model = request
        .resolved_model(&state.config.default_model)
        .to_string();
    let prompt = normalize(&request);

    info!(
        model = %model,
        stream = request.stream,
        messages = request.messages.len(),
        prompt_len = prompt.len(),
        "Processing messages request"
    );
    if state.config.debug_enabled {
        debug!(prompt = %prompt, "Normalized prompt");
    }

    let timeout = match state.config.response_timeout_seconds {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let exchange = Exchange::open(state.backend.as_ref(), &model, &prompt, timeout).await?;

    if request.stream {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .header("X-Accel-Buffering", "no")
            .body(Body::from_stream(exchange.into_stream()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))?;
        Ok(response)
    } else {
        Ok(Json(exchange.collect().await).into_response())
    }
}
