//! Health check endpoints
//!
//! - `/` - plain-text liveness banner
//! - `/health` - JSON status including the session-token cache state

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::TokenStatus;
use crate::AppState;

/// Body served at `/`
pub const LIVENESS_BANNER: &str = "Copilot Proxy is running";

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub backend: &'static str,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub session_token: TokenStatus,
}

/// Liveness probe endpoint
pub async fn liveness_check() -> &'static str {
    LIVENESS_BANNER
}

/// Full health check endpoint. Never exposes the token itself.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.backend.name(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        session_token: state.session_tokens.status().await,
    })
}
