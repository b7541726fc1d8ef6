//! Allow-list bypass for clients that should still reach the application.

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Whether `client_address` is on the allow-list. Exact string match only.
pub fn is_exempt(client_address: &str, allow_list: &HashSet<String>) -> bool {
    allow_list.contains(client_address)
}

/// Resolve the address of the client that sent `request`.
///
/// With `trust_proxy`, the right-most `X-Forwarded-For` entry wins, the one
/// appended by the proxy in front of the gateway. Otherwise the peer address
/// recorded by axum's `ConnectInfo` is used. Returns `None` when neither is
/// available (e.g. the router was served without
/// `into_make_service_with_connect_info`).
pub fn client_address(request: &Request, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        let forwarded = request
            .headers()
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').map(str::trim).find(|v| !v.is_empty()));
        if let Some(addr) = forwarded {
            return Some(addr.to_string());
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}
