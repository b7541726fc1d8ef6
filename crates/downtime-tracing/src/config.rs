//! Tracing configuration types.

use serde::Deserialize;

/// Logging and trace export settings for the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    /// Service name attached to exported spans.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// OTLP collector endpoint (e.g. "http://collector:4317").
    /// When unset, spans are only logged locally.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default)]
    pub protocol: OtlpProtocol,

    /// `EnvFilter` directive, e.g. "info" or "downtime=debug,info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit log lines as JSON objects instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

/// OTLP transport protocol.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

fn default_service_name() -> String {
    "downtime".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            otlp_endpoint: None,
            protocol: OtlpProtocol::default(),
            log_level: default_log_level(),
            json: false,
        }
    }
}
