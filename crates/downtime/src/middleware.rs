//! The maintenance middleware.
//!
//! Per request: when the switch is on and the client is not allow-listed, the
//! configured mode is built and its response replaces the application's.
//! Otherwise the request continues down the stack untouched.
//!
//! ```ignore
//! let maintenance = Arc::new(Maintenance::new(config.maintenance)?);
//! let app = downtime::middleware::protect(Router::new().route("/", get(index)), maintenance);
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use tracing::Instrument;

use crate::access;
use crate::config::{MaintenanceConfig, ModeConfig};
use crate::error::MaintenanceError;
use crate::mode::{
    apply_headers, parse_headers, CallbackRegistry, Mode, ModeContext, ModeRegistry,
};
use crate::render::{FileRenderer, Renderer};
use crate::switch::MaintenanceSwitch;

/// Shared middleware state. Build once, wrap in an `Arc`.
pub struct Maintenance {
    switch: MaintenanceSwitch,
    whitelist: HashSet<String>,
    trust_proxy: bool,
    headers: Vec<(HeaderName, HeaderValue)>,
    mode: ModeConfig,
    app_root: PathBuf,
    renderer: Arc<dyn Renderer>,
    modes: ModeRegistry,
    callbacks: CallbackRegistry,
}

/// Builder for [`Maintenance`]; see [`Maintenance::builder`].
pub struct MaintenanceBuilder {
    config: MaintenanceConfig,
    switch: Option<MaintenanceSwitch>,
    app_root: PathBuf,
    renderer: Option<Arc<dyn Renderer>>,
    modes: ModeRegistry,
    callbacks: CallbackRegistry,
}

impl MaintenanceBuilder {
    /// Share an existing switch (e.g. one also held by an admin handler).
    /// Without this, a new switch is created from `config.enable`.
    pub fn switch(mut self, switch: MaintenanceSwitch) -> Self {
        self.switch = Some(switch);
        self
    }

    /// Root used to resolve the default `Output` file.
    pub fn app_root(mut self, app_root: impl Into<PathBuf>) -> Self {
        self.app_root = app_root.into();
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Make `callback` available to the `Callback` mode under `name`.
    pub fn callback<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Request) -> Result<Option<Response>, MaintenanceError> + Send + Sync + 'static,
    {
        self.callbacks.register(name, callback);
        self
    }

    /// Register a custom mode under `name`.
    pub fn mode<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&ModeContext<'_>) -> Result<Box<dyn Mode>, MaintenanceError> + Send + Sync + 'static,
    {
        self.modes.register(name, factory);
        self
    }

    /// Finish and validate: the mode must be registered, its options must
    /// parse, and a `Callback` mode must name a registered callback.
    pub fn build(self) -> Result<Maintenance, MaintenanceError> {
        let switch = self
            .switch
            .unwrap_or_else(|| MaintenanceSwitch::new(self.config.enable));
        let renderer = self.renderer.unwrap_or_else(|| {
            Arc::new(FileRenderer::new(
                self.app_root.join("templates"),
                self.app_root.join("plugins"),
            ))
        });

        let maintenance = Maintenance {
            switch,
            whitelist: self.config.whitelist,
            trust_proxy: self.config.trust_proxy,
            headers: parse_headers(&self.config.headers)?,
            mode: self.config.mode,
            app_root: self.app_root,
            renderer,
            modes: self.modes,
            callbacks: self.callbacks,
        };
        maintenance.validate()?;
        Ok(maintenance)
    }
}

impl Maintenance {
    pub fn builder(config: MaintenanceConfig) -> MaintenanceBuilder {
        MaintenanceBuilder {
            config,
            switch: None,
            app_root: PathBuf::from("."),
            renderer: None,
            modes: ModeRegistry::with_builtin(),
            callbacks: CallbackRegistry::default(),
        }
    }

    /// Middleware with the built-in modes, default renderer and `.` as app root.
    pub fn new(config: MaintenanceConfig) -> Result<Self, MaintenanceError> {
        Self::builder(config).build()
    }

    pub fn switch(&self) -> &MaintenanceSwitch {
        &self.switch
    }

    pub fn mode_name(&self) -> &str {
        &self.mode.class_name
    }

    /// Check that the configured mode can be constructed.
    pub fn validate(&self) -> Result<(), MaintenanceError> {
        self.build_mode().map(|_| ())
    }

    fn build_mode(&self) -> Result<Box<dyn Mode>, MaintenanceError> {
        let ctx = ModeContext {
            options: &self.mode.config,
            app_root: &self.app_root,
            renderer: &self.renderer,
            callbacks: &self.callbacks,
        };
        self.modes.build(&self.mode.class_name, &ctx)
    }

    /// Whether a request from `client` should currently be intercepted.
    pub fn is_active_for(&self, client: Option<&str>) -> bool {
        if !self.switch.is_enabled() {
            return false;
        }
        !client.is_some_and(|c| access::is_exempt(c, &self.whitelist))
    }

    /// Produce the maintenance response for `request`, or `None` when the
    /// request should reach the application.
    pub fn intercept(&self, request: &Request, client: Option<&str>) -> Result<Option<Response>, MaintenanceError> {
        if !self.is_active_for(client) {
            return Ok(None);
        }

        let mode = self.build_mode()?;
        let Some(mut response) = mode.process(request)? else {
            return Ok(None);
        };
        // Middleware headers win over the mode's own on collision
        apply_headers(&mut response, &self.headers);
        Ok(Some(response))
    }
}

/// Axum middleware function. Install with [`protect`] or
/// `axum::middleware::from_fn_with_state(maintenance, maintenance_layer)`.
pub async fn maintenance_layer(
    State(maintenance): State<Arc<Maintenance>>,
    request: Request,
    next: Next,
) -> Result<Response, MaintenanceError> {
    let client = access::client_address(&request, maintenance.trust_proxy);
    let span = downtime_tracing::maintenance_span!(request.method(), request.uri().path(), client);

    let outcome = span.in_scope(|| maintenance.intercept(&request, client.as_deref()));
    match outcome {
        Ok(Some(response)) => {
            span.record("intercepted", true);
            span.record("mode", maintenance.mode_name());
            span.record("status", response.status().as_u16());
            tracing::debug!(parent: &span, "Request intercepted by maintenance mode");
            Ok(response)
        }
        Ok(None) => {
            span.record("intercepted", false);
            Ok(next.run(request).instrument(span).await)
        }
        Err(e) => {
            span.record("intercepted", true);
            span.record("mode", maintenance.mode_name());
            Err(e)
        }
    }
}

/// Wrap every route of `router` (including its fallback) in the middleware.
pub fn protect<S>(router: Router<S>, maintenance: Arc<Maintenance>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum::middleware::from_fn_with_state(
        maintenance,
        maintenance_layer,
    ))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::config::{ModeOptions, ViewOptions};
    use crate::render::tests::ScratchDir;
    use crate::render::{ViewData, ViewSpec};
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;

    fn config(enable: bool, whitelist: &[&str], class_name: &str, options: ModeOptions) -> MaintenanceConfig {
        MaintenanceConfig {
            enable,
            whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
            trust_proxy: false,
            headers: Default::default(),
            mode: ModeConfig {
                class_name: class_name.to_string(),
                config: options,
            },
        }
    }

    fn request() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_disabled_never_intercepts() {
        // Even a mode that would fail is not touched while disabled
        let m = Maintenance::new(config(false, &[], "Output", ModeOptions {
            path: Some("/definitely/not/here.html".to_string()),
            ..ModeOptions::default()
        }))
        .unwrap();
        assert!(m.intercept(&request(), Some("127.0.0.1")).unwrap().is_none());
    }

    #[test]
    fn test_whitelisted_client_passes() {
        let m = Maintenance::new(config(true, &["127.0.0.1"], "View", ModeOptions::default())).unwrap();
        assert!(m.intercept(&request(), Some("127.0.0.1")).unwrap().is_none());
        assert!(m.intercept(&request(), Some("127.0.0.2")).unwrap().is_some());
        assert!(m.intercept(&request(), None).unwrap().is_some());
    }

    #[test]
    fn test_switch_read_per_request() {
        let switch = MaintenanceSwitch::new(false);
        let m = Maintenance::builder(config(true, &[], "View", ModeOptions::default()))
            .switch(switch.clone())
            .build()
            .unwrap();

        assert!(m.intercept(&request(), None).unwrap().is_none());
        switch.set(true);
        assert!(m.intercept(&request(), None).unwrap().is_some());
        switch.set(false);
        assert!(m.intercept(&request(), None).unwrap().is_none());
    }

    #[test]
    fn test_unknown_mode_rejected_at_build() {
        let result = Maintenance::new(config(true, &[], "Teapot", ModeOptions::default()));
        assert!(matches!(result, Err(MaintenanceError::Configuration(_))));
    }

    #[test]
    fn test_unregistered_callback_rejected_at_build() {
        let options = ModeOptions {
            callback: Some("nope".to_string()),
            ..ModeOptions::default()
        };
        let result = Maintenance::new(config(true, &[], "Callback", options));
        assert!(matches!(result, Err(MaintenanceError::Configuration(_))));
    }

    #[test]
    fn test_missing_output_file_is_fatal_not_passive() {
        let dir = ScratchDir::new();
        let m = Maintenance::builder(config(true, &[], "Output", ModeOptions::default()))
            .app_root(&dir.0)
            .build()
            .unwrap();
        assert!(matches!(
            m.intercept(&request(), None),
            Err(MaintenanceError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_middleware_headers_override_mode_headers() {
        let mut options = ModeOptions::default();
        options.headers.insert("someHeader".to_string(), "fromMode".to_string());
        options
            .headers
            .insert("additionalHeader".to_string(), "additionalValue".to_string());
        let mut cfg = config(true, &[], "View", options);
        cfg.headers.insert("someHeader".to_string(), "fromMiddleware".to_string());
        cfg.headers.insert("Retry-After".to_string(), "600".to_string());

        let m = Maintenance::new(cfg).unwrap();
        let response = m.intercept(&request(), None).unwrap().unwrap();

        assert_eq!(response.headers()["someheader"], "fromMiddleware");
        assert_eq!(response.headers().get_all("someheader").iter().count(), 1);
        assert_eq!(response.headers()["additionalheader"], "additionalValue");
        assert_eq!(response.headers()["retry-after"], "600");
    }

    #[tokio::test]
    async fn test_default_view_renders_builtin_template() {
        let dir = ScratchDir::new();
        let m = Maintenance::builder(config(true, &[], "View", ModeOptions::default()))
            .app_root(&dir.0)
            .build()
            .unwrap();

        let response = m.intercept(&request(), Some("127.0.0.1")).unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let expected = FileRenderer::new(dir.0.join("templates"), dir.0.join("plugins"))
            .render(&ViewSpec::default(), &ViewData::from([
                ("code".to_string(), "503".to_string()),
                ("path".to_string(), "/".to_string()),
            ]))
            .unwrap();
        assert_eq!(body_string(response).await, expected);
    }

    #[tokio::test]
    async fn test_custom_view_from_app_templates() {
        let dir = ScratchDir::new();
        dir.write("templates/Maintenance/maintenance.html", "I'm in a sub-directory");
        dir.write(
            "templates/layout/Maintenance/maintenance.html",
            "Maintenance Header\n{{ content }}Maintenance Footer",
        );
        let options = ModeOptions {
            code: Some(404),
            view: ViewOptions {
                template: Some("maintenance".to_string()),
                template_path: Some("Maintenance".to_string()),
                layout: Some("maintenance".to_string()),
                layout_path: Some("Maintenance".to_string()),
                ..ViewOptions::default()
            },
            ..ModeOptions::default()
        };
        let m = Maintenance::builder(config(true, &[], "View", options))
            .app_root(&dir.0)
            .build()
            .unwrap();

        let response = m.intercept(&request(), None).unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_string(response).await,
            "Maintenance Header\nI'm in a sub-directoryMaintenance Footer"
        );
    }

    #[tokio::test]
    async fn test_output_end_to_end() {
        let dir = ScratchDir::new();
        let path = dir.write("down.html", "X");
        let options = ModeOptions {
            code: Some(404),
            path: Some(path.to_string_lossy().into_owned()),
            ..ModeOptions::default()
        };
        let m = Maintenance::new(config(true, &[], "Output", options)).unwrap();

        let response = m.intercept(&request(), None).unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "X");
    }

    #[test]
    fn test_callback_pass_through_gets_no_headers() {
        let options = ModeOptions {
            callback: Some("api-only".to_string()),
            ..ModeOptions::default()
        };
        let m = Maintenance::builder(config(true, &[], "Callback", options))
            .callback("api-only", |request: &Request| {
                if request.uri().path().starts_with("/api") {
                    Ok(Some(
                        Response::builder()
                            .status(StatusCode::SERVICE_UNAVAILABLE)
                            .body(Body::from("api down"))?,
                    ))
                } else {
                    Ok(None)
                }
            })
            .build()
            .unwrap();

        assert!(m.intercept(&request(), None).unwrap().is_none());

        let api = Request::builder().uri("/api/items").body(Body::empty()).unwrap();
        let response = m.intercept(&api, None).unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    /// Serve `router` with connect info on an ephemeral port.
    async fn serve(router: Router) -> SocketAddr {
        use std::future::IntoFuture;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .into_future(),
        );
        addr
    }

    fn app() -> Router {
        Router::new().route("/", get(|| async { "" }))
    }

    #[tokio::test]
    async fn test_layer_intercepts_over_http() {
        let m = Arc::new(Maintenance::new(config(true, &[], "View", ModeOptions::default())).unwrap());
        let addr = serve(protect(app(), m)).await;

        let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(response.status(), 503);
        let body = response.text().await.unwrap();
        assert!(body.contains("undergoing scheduled maintenance"), "{body}");
    }

    #[tokio::test]
    async fn test_layer_passes_whitelisted_peer() {
        let m = Arc::new(
            Maintenance::new(config(true, &["127.0.0.1"], "View", ModeOptions::default())).unwrap(),
        );
        let addr = serve(protect(app(), m)).await;

        let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_layer_ignores_spoofed_forwarded_for() {
        let mut cfg = config(true, &["10.0.0.5"], "View", ModeOptions::default());
        cfg.trust_proxy = true;
        let addr = serve(protect(app(), Arc::new(Maintenance::new(cfg).unwrap()))).await;
        let client = reqwest::Client::new();

        let spoofed = client
            .get(format!("http://{addr}/"))
            .header("x-forwarded-for", "10.0.0.5, 203.0.113.9")
            .send()
            .await
            .unwrap();
        assert_eq!(spoofed.status(), 503);

        let proxied = client
            .get(format!("http://{addr}/"))
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.5")
            .send()
            .await
            .unwrap();
        assert_eq!(proxied.status(), 200);
    }

    #[tokio::test]
    async fn test_layer_turns_errors_into_500() {
        let dir = ScratchDir::new();
        let m = Arc::new(
            Maintenance::builder(config(true, &[], "Output", ModeOptions::default()))
                .app_root(&dir.0)
                .build()
                .unwrap(),
        );
        let addr = serve(protect(app(), m)).await;

        let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(response.status(), 500);
    }
}
