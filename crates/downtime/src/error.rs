//! Error types for the maintenance middleware.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::render::RenderError;

/// Failure while producing a maintenance response.
///
/// Every variant is fatal for the request it occurred in. The middleware never
/// degrades to passing the request through.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    /// Invalid or missing configuration: unknown mode, unregistered callback,
    /// missing file, malformed header or status code.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Template or layout could not be rendered.
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to open `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build response: {0}")]
    Http(#[from] axum::http::Error),
}

impl MaintenanceError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl IntoResponse for MaintenanceError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Maintenance response failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}
