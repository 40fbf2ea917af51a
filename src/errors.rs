//! Gateway error types.
//!
//! Every variant maps to a short plain-text response.  The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(GatewayError::NotFound { .. })`.  Internal causes are
//! logged where they occur and never reach the response body.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors that are recovered into a clean HTTP status before any body
/// bytes are written.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The object is absent, the key is empty, or the store is unreachable.
    #[error("Not Found")]
    NotFound { key: String },

    /// The Range header is malformed or addresses bytes the object does not have.
    #[error("Requested Range Not Satisfiable")]
    RangeUnsatisfiable {
        /// Object length, when it is known, for the `bytes */{total}` form.
        total_length: Option<u64>,
    },

    /// The access gate rejected the request.
    #[error("Unauthorized")]
    Unauthenticated {
        /// Where to send a browser to obtain a session, if configured.
        login_url: Option<String>,
    },
}

/// A failure after response headers were sent.
///
/// There is no status left to report it with; the relay yields it as a
/// body error so the server aborts the connection.
#[derive(Debug, Error)]
pub enum StreamInterrupted {
    /// The upstream stream reported an error.
    #[error("upstream read failed: {0}")]
    Upstream(#[source] std::io::Error),

    /// No chunk arrived within the idle timeout.
    #[error("upstream idle for {0:?}")]
    IdleTimeout(std::time::Duration),

    /// The upstream ended before the promised length.
    #[error("upstream ended after {sent} of {expected} bytes")]
    ShortBody { sent: u64, expected: u64 },

    /// The upstream produced more than the promised length.
    #[error("upstream sent more than {expected} bytes")]
    Overrun { expected: u64 },
}

impl StreamInterrupted {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            StreamInterrupted::Upstream(_) => "upstream_error",
            StreamInterrupted::IdleTimeout(_) => "idle_timeout",
            StreamInterrupted::ShortBody { .. } => "short_body",
            StreamInterrupted::Overrun { .. } => "overrun",
        }
    }
}

impl GatewayError {
    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::RangeUnsatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            GatewayError::Unauthenticated {
                login_url: Some(_),
            } => StatusCode::SEE_OTHER,
            GatewayError::Unauthenticated { login_url: None } => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response();

        let hdrs = response.headers_mut();
        match self {
            GatewayError::RangeUnsatisfiable {
                total_length: Some(total),
            } => {
                if let Ok(val) = HeaderValue::from_str(&format!("bytes */{total}")) {
                    hdrs.insert(header::CONTENT_RANGE, val);
                }
            }
            GatewayError::Unauthenticated {
                login_url: Some(ref url),
            } => {
                if let Ok(val) = HeaderValue::from_str(url) {
                    hdrs.insert(header::LOCATION, val);
                }
            }
            _ => {}
        }

        response
    }
}
