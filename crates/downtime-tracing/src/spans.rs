//! Span builder helpers for maintenance instrumentation.

/// Span covering one request that went through the maintenance middleware.
///
/// Usage: `let span = maintenance_span!(method, path, client);`
///
/// Fields recorded later:
/// - `intercepted`: whether a substitute response was produced
/// - `mode`: the strategy identifier that produced it
/// - `status`: status code of the substitute response
#[macro_export]
macro_rules! maintenance_span {
    ($method:expr, $path:expr, $client:expr) => {
        tracing::info_span!(
            "maintenance",
            method = %$method,
            path = %$path,
            client = ?$client,
            intercepted = tracing::field::Empty,
            mode = tracing::field::Empty,
            status = tracing::field::Empty,
        )
    };
}

/// Span for a request forwarded to the upstream application.
#[macro_export]
macro_rules! upstream_forward_span {
    ($request_id:expr, $method:expr, $url:expr) => {
        tracing::info_span!(
            "upstream_forward",
            request_id = %$request_id,
            method = %$method,
            url = %$url,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
