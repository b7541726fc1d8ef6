//! Forwarding to the upstream application while maintenance is off.
//!
//! Bytes are streamed through unchanged in both directions; only hop-by-hop
//! headers are dropped.

use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

/// Request ID propagated to the upstream and echoed to the client.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest request body buffered for forwarding.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers that should NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

/// HTTP client bound to one upstream base URL.
#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
}

impl Upstream {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward `request` (any method) and stream the upstream response back.
    pub async fn forward(&self, request: Request) -> Response {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let method = request.method().clone();
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{path_and_query}", self.base_url);

        let span = downtime_tracing::upstream_forward_span!(request_id, method, url);
        let start = Instant::now();

        async {
            let headers = request.headers().clone();
            let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read request body");
                    return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
                }
            };

            let mut req_builder = self
                .client
                .request(method, &url)
                .body(body)
                .header(REQUEST_ID_HEADER, &request_id);

            for (name, value) in forwardable(&headers) {
                if name.as_str() == REQUEST_ID_HEADER {
                    continue;
                }
                req_builder = req_builder.header(name, value);
            }

            let result = req_builder.send().await;
            build_response(result, start, &request_id)
        }
        .instrument(span)
        .await
    }
}

fn forwardable(headers: &HeaderMap) -> impl Iterator<Item = (&axum::http::HeaderName, &HeaderValue)> {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP_HEADERS.contains(&name.as_str()))
}

fn build_response(
    upstream_result: Result<reqwest::Response, reqwest::Error>,
    start: Instant,
    request_id: &str,
) -> Response {
    let upstream_resp = match upstream_result {
        Ok(resp) => resp,
        Err(e) => {
            let latency = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("latency_ms", latency);
            tracing::Span::current().record("status", 502_u16);

            if e.is_timeout() {
                tracing::error!(error = %e, "Upstream timeout");
                return (StatusCode::GATEWAY_TIMEOUT, "upstream timeout").into_response();
            }
            tracing::error!(error = %e, "Upstream connection error");
            return (StatusCode::BAD_GATEWAY, "upstream connection error").into_response();
        }
    };

    let status = upstream_resp.status();
    let latency = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("latency_ms", latency);
    tracing::Span::current().record("status", status.as_u16());
    tracing::debug!(status = status.as_u16(), latency_ms = latency, "Forward complete");

    let mut response_builder = Response::builder()
        .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));

    for (name, value) in forwardable(upstream_resp.headers()) {
        response_builder = response_builder.header(name, value);
    }
    response_builder = response_builder.header(
        REQUEST_ID_HEADER,
        HeaderValue::from_str(request_id).unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );

    let body = Body::from_stream(upstream_resp.bytes_stream());

    response_builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build response");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    })
}
