//! Prometheus metrics for blobgate.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "blobgate_http_requests_total";

/// Time to response headers in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "blobgate_http_request_duration_seconds";

/// Object responses by outcome (counter). Labels: route, outcome.
pub const OBJECT_RESPONSES_TOTAL: &str = "blobgate_object_responses_total";

/// Failed store calls (counter). Labels: operation, cause.
pub const STORE_FAILURES_TOTAL: &str = "blobgate_store_failures_total";

/// Streams aborted after headers were sent (counter). Labels: reason.
pub const STREAM_INTERRUPTIONS_TOTAL: &str = "blobgate_stream_interruptions_total";

/// Total object bytes relayed to clients (counter).
pub const BYTES_SENT_TOTAL: &str = "blobgate_bytes_sent_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "Time to response headers in seconds"
    );
    describe_counter!(OBJECT_RESPONSES_TOTAL, "Object responses by outcome");
    describe_counter!(STORE_FAILURES_TOTAL, "Failed backing store calls by cause");
    describe_counter!(
        STREAM_INTERRUPTIONS_TOTAL,
        "Object streams aborted after headers were sent"
    );
    describe_counter!(BYTES_SENT_TOTAL, "Total object bytes relayed to clients");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
/// Streaming bodies outlive this middleware, so the duration covers the
/// time to headers; relayed bytes are counted by the relay itself.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a route template for metric labels.
///
/// Object keys never become label values.
///
/// Examples:
/// - `/health` -> `/health`
/// - `/stream/movies/a.mp4` -> `/stream/{key}`
/// - `/download/a.zip` -> `/download/{key}`
/// - `/favicon.ico` -> `other`
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/openapi.json" => "/openapi.json",
        "/api/list" => "/api/list",
        _ if path.starts_with("/stream/") => "/stream/{key}",
        _ if path.starts_with("/download/") => "/download/{key}",
        _ => "other",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_fixed_routes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/metrics"), "/metrics");
        assert_eq!(normalize_path("/openapi.json"), "/openapi.json");
        assert_eq!(normalize_path("/api/list"), "/api/list");
    }

    #[test]
    fn test_normalize_path_object_routes() {
        assert_eq!(normalize_path("/stream/a.mp4"), "/stream/{key}");
        assert_eq!(
            normalize_path("/stream/movies/2024/clip.webm"),
            "/stream/{key}"
        );
        assert_eq!(normalize_path("/download/music/b.flac"), "/download/{key}");
    }

    #[test]
    fn test_normalize_path_unknown() {
        assert_eq!(normalize_path("/favicon.ico"), "other");
        assert_eq!(normalize_path("/streaming"), "other");
    }
}
