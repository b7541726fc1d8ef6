//! downtime: maintenance gateway in front of an upstream application.

use std::sync::Arc;
use std::time::Duration;

use downtime::config::GatewayConfig;
use downtime::middleware::Maintenance;
use downtime::render::FileRenderer;
use downtime::server::{self, AppState};
use downtime::upstream::Upstream;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("DOWNTIME_CONFIG").ok())
        .unwrap_or_else(|| "downtime.toml".to_string());

    let listen_override = args
        .iter()
        .position(|a| a == "--listen")
        .and_then(|i| args.get(i + 1).cloned());

    let enable_override = args.iter().any(|a| a == "--enable");

    let mut config = GatewayConfig::load(&config_path)?;

    // CLI overrides take precedence over TOML and env vars
    if let Some(addr) = listen_override {
        config.server.listen_address = addr;
    }
    if enable_override {
        config.maintenance.enable = true;
    }

    // The tonic OTLP exporter needs a reactor, so build the runtime first
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = downtime_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            upstream = %config.upstream.url,
            enabled = config.maintenance.enable,
            mode = %config.maintenance.mode.class_name,
            otlp_export = tracing_guard.exporting(),
            "Starting downtime"
        );

        run(config).await
    })
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let renderer = Arc::new(FileRenderer::new(
        config.templates.root.clone(),
        config.templates.plugins.clone(),
    ));
    let maintenance = Maintenance::builder(config.maintenance)
        .app_root(config.server.app_root)
        .renderer(renderer)
        .build()?;

    let state = AppState {
        maintenance: Arc::new(maintenance),
        upstream: Upstream::new(client, config.upstream.url),
    };

    server::run(state, &config.server.listen_address).await
}
