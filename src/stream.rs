//! Range-aware object streaming.
//!
//! A request flows through four steps:
//!
//! 1. [`resolve`] fetches the object's metadata and, when a `Range` header
//!    is present, validates it against the true length.  The outcome is a
//!    [`StreamResult`].
//! 2. [`open_stream`] asks the store for exactly the bytes the result
//!    promises (whole object or one span).
//! 3. [`relay`] wraps the upstream stream, enforcing an idle timeout and
//!    checking that exactly the promised number of bytes arrives.
//! 4. [`write_response`] turns the result into a status line and headers,
//!    with the relayed stream as the body.
//!
//! Headers are complete before the first body byte is polled.  A failure
//! after that point cannot become an error status; the relay yields an
//! error, which makes the server abort the connection.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use metrics::counter;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, warn};

use crate::errors::{GatewayError, StreamInterrupted};
use crate::metrics::{
    BYTES_SENT_TOTAL, OBJECT_RESPONSES_TOTAL, STORE_FAILURES_TOTAL, STREAM_INTERRUPTIONS_TOTAL,
};
use crate::range::{parse_range, ByteRange};
use crate::storage::backend::{ByteStream, ObjectMetadata, StorageBackend, StoreError};

/// Characters left unescaped in an RFC 5987 `filename*` value.
const FILENAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// How the object is delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Rendered in place; `Range` is honoured.
    Inline,
    /// Saved as a file; `Range` is ignored.
    Attachment,
}

impl Delivery {
    fn route(self) -> &'static str {
        match self {
            Delivery::Inline => "stream",
            Delivery::Attachment => "download",
        }
    }
}

/// One incoming object request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Object key.
    pub key: String,
    /// Raw `Range` header text, if any.
    pub range: Option<String>,
    /// HEAD request: resolve and answer with headers, never open the object.
    pub headers_only: bool,
}

impl StreamRequest {
    /// Build a request for `key`, picking up the `Range` header when the
    /// delivery mode honours it.
    pub fn new(
        key: impl Into<String>,
        method: &Method,
        headers: &HeaderMap,
        delivery: Delivery,
    ) -> Self {
        let range = match delivery {
            Delivery::Inline => headers
                .get(header::RANGE)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
            Delivery::Attachment => None,
        };
        Self {
            key: key.into(),
            range,
            headers_only: method == Method::HEAD,
        }
    }
}

/// What a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamResult {
    /// Whole object, 200.
    Full(ObjectMetadata),
    /// One span, 206.
    Partial {
        range: ByteRange,
        metadata: ObjectMetadata,
    },
    /// The range cannot be served, 416.
    Unsatisfiable { total_length: u64 },
    /// Missing key or store failure, 404.
    NotFound { key: String },
}

impl StreamResult {
    /// Span to fetch for satisfiable results: `Some(None)` for the whole
    /// object, `Some(Some(range))` for a span, `None` when nothing is fetched.
    pub fn fetch_span(&self) -> Option<Option<ByteRange>> {
        match self {
            StreamResult::Full(_) => Some(None),
            StreamResult::Partial { range, .. } => Some(Some(*range)),
            StreamResult::Unsatisfiable { .. } | StreamResult::NotFound { .. } => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            StreamResult::Full(_) => "full",
            StreamResult::Partial { .. } => "partial",
            StreamResult::Unsatisfiable { .. } => "unsatisfiable",
            StreamResult::NotFound { .. } => "not_found",
        }
    }
}

/// Decide the result from a metadata snapshot and an optional `Range` value.
pub fn plan(metadata: ObjectMetadata, range_header: Option<&str>) -> StreamResult {
    match range_header {
        None => StreamResult::Full(metadata),
        Some(value) => match parse_range(value, metadata.total_length) {
            Ok(range) => StreamResult::Partial { range, metadata },
            Err(_) => StreamResult::Unsatisfiable {
                total_length: metadata.total_length,
            },
        },
    }
}

/// Fetch metadata for `key`, bounded by `timeout`.
///
/// Every store failure becomes [`GatewayError::NotFound`]; the cause is
/// logged and counted here.
pub async fn resolve_metadata(
    store: &dyn StorageBackend,
    key: &str,
    timeout: Duration,
) -> Result<ObjectMetadata, GatewayError> {
    with_timeout("head", timeout, store.head(key))
        .await
        .map_err(|err| {
            record_store_failure("head", key, &err);
            GatewayError::NotFound {
                key: key.to_string(),
            }
        })
}

/// Resolve a request into a [`StreamResult`].
pub async fn resolve(
    store: &dyn StorageBackend,
    request: &StreamRequest,
    timeout: Duration,
) -> StreamResult {
    if request.key.is_empty() {
        return StreamResult::NotFound { key: String::new() };
    }
    match resolve_metadata(store, &request.key, timeout).await {
        Ok(metadata) => plan(metadata, request.range.as_deref()),
        Err(_) => StreamResult::NotFound {
            key: request.key.clone(),
        },
    }
}

/// Open the upstream stream for `key`, restricted to `range` when given.
pub async fn open_stream(
    store: &dyn StorageBackend,
    key: &str,
    range: Option<ByteRange>,
    timeout: Duration,
) -> Result<ByteStream, StoreError> {
    with_timeout("get", timeout, store.get(key, range))
        .await
        .inspect_err(|err| record_store_failure("get", key, err))
}

/// Run a store call with a deadline; a timeout counts as unavailability.
pub(crate) async fn with_timeout<T>(
    operation: &str,
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(anyhow::anyhow!(
            "{operation} timed out after {timeout:?}"
        ))),
    }
}

/// Log and count a failed store call.
pub(crate) fn record_store_failure(operation: &'static str, key: &str, err: &StoreError) {
    match err {
        StoreError::NotFound { .. } => debug!("Store {} for '{}': not found", operation, key),
        StoreError::Unavailable(e) => warn!("Store {} for '{}' failed: {:#}", operation, key, e),
    }
    counter!(STORE_FAILURES_TOTAL, "operation" => operation, "cause" => err.cause()).increment(1);
}

// -- Relay --------------------------------------------------------------------

/// Per-response relay state.
struct Relay {
    upstream: ByteStream,
    key: String,
    expected: u64,
    sent: u64,
    idle_timeout: Duration,
    finished: bool,
}

impl Relay {
    fn interrupt(mut self, cause: StreamInterrupted) -> Option<(std::io::Result<Bytes>, Self)> {
        warn!(
            "Stream for '{}' interrupted after {}/{} bytes: {}",
            self.key, self.sent, self.expected, cause
        );
        counter!(STREAM_INTERRUPTIONS_TOTAL, "reason" => cause.reason()).increment(1);
        self.finished = true;
        Some((Err(std::io::Error::other(cause)), self))
    }
}

impl Relay {
    fn finish(&mut self) {
        debug!("Stream for '{}' complete: {} bytes", self.key, self.sent);
        self.finished = true;
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if !self.finished {
            // The client went away; dropping `upstream` releases it.
            debug!(
                "Client disconnected from '{}' after {}/{} bytes",
                self.key, self.sent, self.expected
            );
        }
    }
}

/// Relay `upstream` to the client, expecting exactly `expected` bytes.
///
/// Ends cleanly only when the upstream ends at exactly `expected` bytes.
/// An upstream error, a stall longer than `idle_timeout`, or a length
/// mismatch yields one error item and then ends the stream.
pub fn relay(
    upstream: ByteStream,
    key: &str,
    expected: u64,
    idle_timeout: Duration,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let state = Relay {
        upstream,
        key: key.to_string(),
        expected,
        sent: 0,
        idle_timeout,
        finished: false,
    };

    futures::stream::unfold(state, |mut relay| async move {
        if relay.finished {
            return None;
        }
        let next = tokio::time::timeout(relay.idle_timeout, relay.upstream.next()).await;
        match next {
            Ok(Some(Ok(chunk))) => {
                let len = chunk.len() as u64;
                if relay.sent + len > relay.expected {
                    let cause = StreamInterrupted::Overrun {
                        expected: relay.expected,
                    };
                    return relay.interrupt(cause);
                }
                relay.sent += len;
                counter!(BYTES_SENT_TOTAL).increment(len);
                Some((Ok(chunk), relay))
            }
            Ok(Some(Err(err))) => relay.interrupt(StreamInterrupted::Upstream(err)),
            Ok(None) if relay.sent < relay.expected => {
                let cause = StreamInterrupted::ShortBody {
                    sent: relay.sent,
                    expected: relay.expected,
                };
                relay.interrupt(cause)
            }
            Ok(None) => {
                relay.finish();
                None
            }
            Err(_) => {
                let cause = StreamInterrupted::IdleTimeout(relay.idle_timeout);
                relay.interrupt(cause)
            }
        }
    })
}

// -- Response writer ----------------------------------------------------------

/// Build the `Content-Disposition` value that makes a client save the
/// object under its base name.
pub fn attachment_disposition(key: &str) -> String {
    let name = key.rsplit('/').find(|s| !s.is_empty()).unwrap_or("download");
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(name, FILENAME_SAFE);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

/// Emit the response for `result`.
///
/// `body` is the stream opened for [`StreamResult::fetch_span`] when the
/// result is satisfiable, or `None` for a HEAD request, which gets the same
/// headers over an empty body.  It is ignored for error results.
pub fn write_response(
    result: StreamResult,
    key: &str,
    body: Option<ByteStream>,
    delivery: Delivery,
    idle_timeout: Duration,
) -> Response {
    counter!(
        OBJECT_RESPONSES_TOTAL,
        "route" => delivery.route(),
        "outcome" => result.outcome()
    )
    .increment(1);

    let (status, metadata, range) = match result {
        StreamResult::Full(metadata) => (StatusCode::OK, metadata, None),
        StreamResult::Partial { range, metadata } => {
            (StatusCode::PARTIAL_CONTENT, metadata, Some(range))
        }
        StreamResult::Unsatisfiable { total_length } => {
            return GatewayError::RangeUnsatisfiable {
                total_length: Some(total_length),
            }
            .into_response();
        }
        StreamResult::NotFound { key } => {
            return GatewayError::NotFound { key }.into_response();
        }
    };

    let content_length = range.map_or(metadata.total_length, |r| r.len());
    let body = match body {
        Some(upstream) => Body::from_stream(relay(upstream, key, content_length, idle_timeout)),
        None => Body::empty(),
    };

    let mut response = (status, body).into_response();
    let hdrs = response.headers_mut();

    hdrs.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&metadata.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    hdrs.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));

    if let Some(range) = range {
        if let Ok(val) = HeaderValue::from_str(&range.content_range(metadata.total_length)) {
            hdrs.insert(header::CONTENT_RANGE, val);
        }
        hdrs.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    }

    response
}

/// Resolve, fetch and write one object response.
pub async fn serve(
    store: &dyn StorageBackend,
    request: StreamRequest,
    delivery: Delivery,
    store_timeout: Duration,
    idle_timeout: Duration,
) -> Response {
    let result = resolve(store, &request, store_timeout).await;

    let body = match result.fetch_span() {
        Some(_) if request.headers_only => None,
        Some(span) => match open_stream(store, &request.key, span, store_timeout).await {
            Ok(stream) => Some(stream),
            Err(_) => {
                let not_found = StreamResult::NotFound {
                    key: request.key.clone(),
                };
                return write_response(not_found, &request.key, None, delivery, idle_timeout);
            }
        },
        None => None,
    };

    let disposition = match (&result, delivery) {
        (StreamResult::Full(_) | StreamResult::Partial { .. }, Delivery::Attachment) => {
            HeaderValue::from_str(&attachment_disposition(&request.key)).ok()
        }
        _ => None,
    };

    let mut response = write_response(result, &request.key, body, delivery, idle_timeout);
    if let Some(val) = disposition {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, val);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn meta(total_length: u64) -> ObjectMetadata {
        ObjectMetadata {
            total_length,
            content_type: "video/mp4".to_string(),
        }
    }

    fn chunks(items: Vec<std::io::Result<Bytes>>) -> ByteStream {
        Box::pin(futures::stream::iter(items))
    }

    #[test]
    fn test_plan_without_range_is_full() {
        assert_eq!(plan(meta(1000), None), StreamResult::Full(meta(1000)));
    }

    #[test]
    fn test_plan_with_valid_range_is_partial() {
        match plan(meta(1000), Some("bytes=0-499")) {
            StreamResult::Partial { range, metadata } => {
                assert_eq!((range.start(), range.end()), (0, 499));
                assert_eq!(metadata.total_length, 1000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_plan_with_bad_range_is_unsatisfiable() {
        assert_eq!(
            plan(meta(1000), Some("bytes=999-1500")),
            StreamResult::Unsatisfiable { total_length: 1000 }
        );
        assert_eq!(
            plan(meta(1000), Some("bytes=-10")),
            StreamResult::Unsatisfiable { total_length: 1000 }
        );
    }

    #[test]
    fn test_request_ignores_range_for_attachments() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=0-1"));
        let inline = StreamRequest::new("a.mp4", &Method::GET, &headers, Delivery::Inline);
        assert_eq!(inline.range.as_deref(), Some("bytes=0-1"));
        assert!(!inline.headers_only);
        let download = StreamRequest::new("a.mp4", &Method::GET, &headers, Delivery::Attachment);
        assert_eq!(download.range, None);
    }

    #[test]
    fn test_head_request_is_headers_only() {
        let request = StreamRequest::new("a.mp4", &Method::HEAD, &HeaderMap::new(), Delivery::Inline);
        assert!(request.headers_only);
    }

    #[test]
    fn test_fetch_span() {
        assert_eq!(StreamResult::Full(meta(5)).fetch_span(), Some(None));
        assert_eq!(
            StreamResult::Unsatisfiable { total_length: 5 }.fetch_span(),
            None
        );
        assert_eq!(
            StreamResult::NotFound {
                key: "x".to_string()
            }
            .fetch_span(),
            None
        );
    }

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("movies/clip one.mp4"),
            "attachment; filename=\"clip one.mp4\"; filename*=UTF-8''clip%20one.mp4"
        );
        assert_eq!(
            attachment_disposition("música/canción.mp3"),
            "attachment; filename=\"canci_n.mp3\"; filename*=UTF-8''canci%C3%B3n.mp3"
        );
        assert_eq!(
            attachment_disposition("a\"b.txt"),
            "attachment; filename=\"a_b.txt\"; filename*=UTF-8''a%22b.txt"
        );
    }

    #[tokio::test]
    async fn test_relay_passes_exact_length() {
        let upstream = chunks(vec![Ok(Bytes::from("hello ")), Ok(Bytes::from("world"))]);
        let out: Vec<Bytes> = relay(upstream, "k", 11, Duration::from_secs(5))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.concat(), b"hello world");
    }

    #[tokio::test]
    async fn test_relay_short_body_is_an_error() {
        let upstream = chunks(vec![Ok(Bytes::from("hello"))]);
        let items: Vec<std::io::Result<Bytes>> =
            relay(upstream, "k", 11, Duration::from_secs(5)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_relay_upstream_error_ends_stream() {
        let upstream = chunks(vec![
            Ok(Bytes::from("abc")),
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from("never")),
        ]);
        let items: Vec<std::io::Result<Bytes>> =
            relay(upstream, "k", 100, Duration::from_secs(5)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_relay_overrun_is_an_error() {
        let upstream = chunks(vec![Ok(Bytes::from("too many bytes"))]);
        let items: Vec<std::io::Result<Bytes>> =
            relay(upstream, "k", 3, Duration::from_secs(5)).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_idle_timeout() {
        let upstream: ByteStream = Box::pin(
            futures::stream::iter(vec![Ok(Bytes::from("a"))]).chain(futures::stream::pending()),
        );
        let items: Vec<std::io::Result<Bytes>> =
            relay(upstream, "k", 10, Duration::from_secs(1)).collect().await;
        assert_eq!(items.len(), 2);
        let err = items[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("idle"), "{err}");
    }

    #[tokio::test]
    async fn test_relay_empty_object() {
        let items: Vec<std::io::Result<Bytes>> =
            relay(chunks(vec![]), "k", 0, Duration::from_secs(5)).collect().await;
        assert!(items.is_empty());
    }
}
