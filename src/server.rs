//! Axum router construction.
//!
//! The [`app`] function wires the object, download and listing routes
//! behind the session gate, adds the public health, metrics and OpenAPI
//! routes, and returns a ready-to-serve [`axum::Router`].

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, GatewayError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the blobgate HTTP API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "blobgate",
        version = "0.1.0",
        description = "Authenticated, range-aware streaming gateway over a blob store"
    ),
    paths(
        health_check,
        crate::handlers::object::stream_object,
        crate::handlers::object::download_object,
        crate::handlers::listing::list_prefix,
    ),
    components(schemas(
        crate::handlers::listing::ListingResponse,
        crate::handlers::listing::FileEntry,
    )),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Object", description = "Object streaming and download"),
        (name = "Listing", description = "Folder browsing"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`].
///
/// The session gate runs as a route layer on the protected routes only,
/// so it sees every object and listing request before any store call and
/// never sees unmatched paths.
pub fn app(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/stream/", get(handle_stream_root))
        .route("/stream/*key", get(handle_stream))
        .route("/download/", get(handle_download_root))
        .route("/download/*key", get(handle_download))
        .route("/api/list", get(handle_list))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json))
        .merge(protected);

    let metrics_enabled = state.config.observability.metrics;
    if metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let cors = state.config.server.cors;

    // Layer ordering: the last layer added is the outermost.
    let mut router = router
        .with_state(state)
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http());

    if metrics_enabled {
        router = router.layer(middleware::from_fn(metrics_middleware));
    }
    if cors {
        router = router.layer(CorsLayer::permissive());
    }
    router
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id`, `Date` and `Server` to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(val) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", val);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(val) = HeaderValue::from_str(&date) {
        headers.insert("date", val);
    }
    headers.insert("server", HeaderValue::from_static("blobgate"));

    response
}

// -- Session middleware ------------------------------------------------------

/// Reject requests without a valid session before any store access.
///
/// On success the [`crate::auth::Session`] is stored in the request
/// extensions.
async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    match state.gate.check(req.headers()) {
        Ok(session) => {
            debug!("Session OK for '{}' on {}", session.user, req.uri().path());
            req.extensions_mut().insert(session);
            Ok(next.run(req).await)
        }
        Err(err) => {
            debug!("Session rejected on {}: {}", req.uri().path(), err);
            Err(GatewayError::Unauthenticated {
                login_url: state.config.auth.login_url.clone(),
            })
        }
    }
}

// -- Health / docs -------------------------------------------------------------

/// `GET /health` -- Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Server is running")
    )
)]
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /openapi.json` -- The OpenAPI document for this server.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Route adapters -----------------------------------------------------------

async fn handle_stream(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    crate::handlers::object::stream_object(state, &key, &method, &headers).await
}

async fn handle_stream_root(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    crate::handlers::object::stream_object(state, "", &method, &headers).await
}

async fn handle_download(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    crate::handlers::object::download_object(state, &key, &method, &headers).await
}

async fn handle_download_root(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    crate::handlers::object::download_object(state, "", &method, &headers).await
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    prefix: String,
}

async fn handle_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Response, GatewayError> {
    crate::handlers::listing::list_prefix(state, &query.prefix).await
}

// -- Tests --------------------------------------------------------------------
