//! Prometheus metrics endpoint
//!
//! Counters for translated requests, session-token lookups and backend
//! failures, rendered in Prometheus text format.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tracing::debug;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if metrics::set_global_recorder(recorder).is_err() {
        debug!("Metrics recorder already installed");
    }
    handle
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    let _ = &*PROMETHEUS_HANDLE;
    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "copilot_proxy_requests_total",
        "Total number of /v1/messages requests processed"
    );
    metrics::describe_histogram!(
        "copilot_proxy_request_duration_seconds",
        "Time from request receipt to end of response"
    );
    metrics::describe_counter!(
        "copilot_proxy_token_lookups_total",
        "Session-token cache lookups by result"
    );
    metrics::describe_counter!(
        "copilot_proxy_backend_errors_total",
        "Backend failures by stage"
    );
    metrics::describe_gauge!(
        "copilot_proxy_active_sessions",
        "Backend sessions currently open"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record a finished request. `mode` is `stream` or `buffered`.
pub fn record_request(mode: &'static str, model: &str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!(
        "copilot_proxy_requests_total",
        "mode" => mode,
        "model" => model.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        "copilot_proxy_request_duration_seconds",
        "mode" => mode,
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Record a session-token cache lookup (`hit`, `refreshed` or `failed`).
pub fn record_token_lookup(result: &'static str) {
    metrics::counter!("copilot_proxy_token_lookups_total", "result" => result).increment(1);
}

/// Record a backend failure at `stage` (`create`, `send`, `event`, `timeout`).
pub fn record_backend_error(stage: &'static str) {
    metrics::counter!("copilot_proxy_backend_errors_total", "stage" => stage).increment(1);
}

pub fn session_opened() {
    metrics::gauge!("copilot_proxy_active_sessions").increment(1.0);
}

pub fn session_closed() {
    metrics::gauge!("copilot_proxy_active_sessions").decrement(1.0);
}
