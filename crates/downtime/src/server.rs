//! Gateway HTTP server: admin routes, maintenance-protected passthrough,
//! graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::middleware::{protect, Maintenance};
use crate::upstream::Upstream;

/// Shared gateway state.
#[derive(Clone)]
pub struct AppState {
    pub maintenance: Arc<Maintenance>,
    pub upstream: Upstream,
}

/// Build the gateway router.
///
/// `/health` and `/api/maintenance` are answered by the gateway itself and
/// are never intercepted. Everything else goes through the maintenance
/// middleware and, when let through, to the upstream.
pub fn router(state: AppState) -> Router {
    let passthrough = Router::new()
        .fallback(handle_forward)
        .with_state(state.upstream.clone());
    let passthrough = protect(passthrough, Arc::clone(&state.maintenance));

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/api/maintenance",
            get(handle_get_maintenance).put(handle_set_maintenance),
        )
        .fallback_service(passthrough)
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Bind `listen_addr` and serve until Ctrl+C.
pub async fn run(state: AppState, listen_addr: &str) -> anyhow::Result<()> {
    let upstream = state.upstream.base_url().to_string();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(address = %listen_addr, upstream = %upstream, "downtime listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("downtime shut down gracefully");
    Ok(())
}

async fn handle_forward(State(upstream): State<Upstream>, request: Request) -> Response {
    upstream.forward(request).await
}

/// GET /api/maintenance: current switch state and mode.
async fn handle_get_maintenance(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(serde_json::json!({
        "enabled": state.maintenance.switch().is_enabled(),
        "mode": state.maintenance.mode_name(),
    }))
    .into_response()
}

/// PUT /api/maintenance: turn maintenance on or off.
async fn handle_set_maintenance(
    State(state): State<Arc<AppState>>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> Response {
    let enabled = match payload.get("enabled").and_then(|v| v.as_bool()) {
        Some(b) => b,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(serde_json::json!({ "error": "missing 'enabled' boolean field" })),
            )
                .into_response();
        }
    };

    let previous = state.maintenance.switch().set(enabled);
    if previous != enabled {
        tracing::info!(enabled, "Maintenance mode toggled");
    }
    axum::Json(serde_json::json!({ "enabled": enabled })).into_response()
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
