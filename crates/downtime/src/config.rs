//! Configuration types and loading logic.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use downtime_tracing::TracingConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

/// Extra headers, name to value.
pub type HeaderConfig = BTreeMap<String, String>;

/// Maintenance middleware settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaintenanceConfig {
    /// Initial state of the runtime switch.
    #[serde(default)]
    pub enable: bool,

    /// Client addresses that always reach the application.
    #[serde(default)]
    pub whitelist: HashSet<String>,

    /// Resolve the client address from `X-Forwarded-For`.
    #[serde(default)]
    pub trust_proxy: bool,

    /// Headers added to every maintenance response, after the mode's own.
    #[serde(default)]
    pub headers: HeaderConfig,

    #[serde(default)]
    pub mode: ModeConfig,
}

/// Which mode produces the maintenance response, and its options.
#[derive(Debug, Clone, Deserialize)]
pub struct ModeConfig {
    /// Registered mode identifier: `Output`, `View`, `Callback`, `Redirect`
    /// or a custom registration. Matched case-insensitively.
    #[serde(rename = "className", alias = "class_name", default = "default_class_name")]
    pub class_name: String,

    #[serde(default)]
    pub config: ModeOptions,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            class_name: default_class_name(),
            config: ModeOptions::default(),
        }
    }
}

/// Options shared by the built-in modes. Each mode reads the keys it knows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModeOptions {
    /// Response status code. Defaults depend on the mode.
    #[serde(default)]
    pub code: Option<u16>,

    /// File served by `Output`.
    #[serde(default)]
    pub path: Option<String>,

    /// Location used by `Redirect`.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub view: ViewOptions,

    /// Name of a function registered with the callback registry.
    #[serde(default)]
    pub callback: Option<String>,

    #[serde(default)]
    pub headers: HeaderConfig,
}

/// Template selection for the `View` mode. Unset values use the built-ins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ViewOptions {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, rename = "templatePath", alias = "template_path")]
    pub template_path: Option<String>,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default, rename = "layoutPath", alias = "layout_path")]
    pub layout_path: Option<String>,
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

fn default_class_name() -> String {
    "View".to_string()
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Application root; `Output` falls back to `<app_root>/maintenance.html`.
    #[serde(default = "default_app_root")]
    pub app_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            app_root: default_app_root(),
        }
    }
}

/// The application traffic is forwarded to while maintenance is off.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Template search roots for the `View` mode.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_templates_root")]
    pub root: PathBuf,

    #[serde(default = "default_plugins_root")]
    pub plugins: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            root: default_templates_root(),
            plugins: default_plugins_root(),
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_app_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_templates_root() -> PathBuf {
    PathBuf::from("templates")
}

fn default_plugins_root() -> PathBuf {
    PathBuf::from("plugins")
}

/// Keys spelled in camelCase in the config file.
const CAMEL_CASE_KEYS: &[&str] = &["className", "templatePath", "layoutPath"];

/// Lowercase an env-derived key path, restoring the camelCase keys so env
/// values land on the same keys as the TOML file.
fn env_key(key: &str) -> String {
    key.split('.')
        .map(|segment| {
            CAMEL_CASE_KEYS
                .iter()
                .find(|k| k.eq_ignore_ascii_case(segment))
                .map(|k| k.to_string())
                .unwrap_or_else(|| segment.to_ascii_lowercase())
        })
        .collect::<Vec<_>>()
        .join(".")
}

impl GatewayConfig {
    /// Load configuration from a TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (DOWNTIME_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(config_path))
                .merge(
                    Env::prefixed("DOWNTIME_")
                        .split("__")
                        .lowercase(false)
                        .map(|key| env_key(key.as_str()).into()),
                ),
        )
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        Ok(figment.extract()?)
    }
}
