//! Object streaming and download handlers.

use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use axum::response::Response;
use tracing::debug;

use crate::stream::{serve, Delivery, StreamRequest};
use crate::AppState;

/// `GET /stream/{key}` -- Stream an object, honouring `Range`.
#[utoipa::path(
    get,
    path = "/stream/{key}",
    tag = "Object",
    operation_id = "StreamObject",
    params(
        ("key" = String, Path, description = "Object key (may contain '/')"),
        ("Range" = Option<String>, Header, description = "Single span: bytes=<start>-<end?>"),
    ),
    responses(
        (status = 200, description = "Whole object"),
        (status = 206, description = "Partial content (range request)"),
        (status = 401, description = "No valid session"),
        (status = 404, description = "Object not found or store unavailable"),
        (status = 416, description = "Range not satisfiable")
    )
)]
pub async fn stream_object(
    state: Arc<AppState>,
    key: &str,
    method: &Method,
    headers: &HeaderMap,
) -> Response {
    let request = StreamRequest::new(key, method, headers, Delivery::Inline);
    debug!("Stream '{}' range={:?}", request.key, request.range);
    serve(
        state.storage.as_ref(),
        request,
        Delivery::Inline,
        state.store_timeout(),
        state.stream_idle_timeout(),
    )
    .await
}

/// `GET /download/{key}` -- Send the whole object as a file download.
#[utoipa::path(
    get,
    path = "/download/{key}",
    tag = "Object",
    operation_id = "DownloadObject",
    params(
        ("key" = String, Path, description = "Object key (may contain '/')"),
    ),
    responses(
        (status = 200, description = "Whole object with Content-Disposition: attachment"),
        (status = 401, description = "No valid session"),
        (status = 404, description = "Object not found or store unavailable")
    )
)]
pub async fn download_object(
    state: Arc<AppState>,
    key: &str,
    method: &Method,
    headers: &HeaderMap,
) -> Response {
    let request = StreamRequest::new(key, method, headers, Delivery::Attachment);
    debug!("Download '{}'", request.key);
    serve(
        state.storage.as_ref(),
        request,
        Delivery::Attachment,
        state.store_timeout(),
        state.stream_idle_timeout(),
    )
    .await
}
