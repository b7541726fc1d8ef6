//! Maintenance modes: strategies that produce the substitute response.
//!
//! A mode is built fresh for every intercepted request from the configured
//! options and dropped once it has produced its response. Modes are looked up
//! by identifier in a [`ModeRegistry`].

mod callback;
mod output;
mod redirect;
mod view;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

use crate::config::{HeaderConfig, ModeOptions};
use crate::error::MaintenanceError;
use crate::render::Renderer;

pub use callback::{CallbackFn, CallbackMode, CallbackRegistry};
pub use output::{FileBody, OutputMode};
pub use redirect::RedirectMode;
pub use view::ViewMode;

/// Produces the response served while maintenance is active.
pub trait Mode: Send {
    /// `Ok(None)` lets the request continue to the application.
    fn process(&self, request: &Request) -> Result<Option<Response>, MaintenanceError>;
}

/// Everything a mode constructor may draw on.
pub struct ModeContext<'a> {
    pub options: &'a ModeOptions,
    pub app_root: &'a Path,
    pub renderer: &'a Arc<dyn Renderer>,
    pub callbacks: &'a CallbackRegistry,
}

pub type ModeFactory =
    Arc<dyn Fn(&ModeContext<'_>) -> Result<Box<dyn Mode>, MaintenanceError> + Send + Sync>;

/// Mode identifier to constructor. Identifiers are case-insensitive.
#[derive(Clone)]
pub struct ModeRegistry {
    factories: HashMap<String, ModeFactory>,
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ModeRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding `Output`, `View`, `Callback` and `Redirect`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("Output", |ctx| {
            Ok(Box::new(OutputMode::new(ctx.options, ctx.app_root)?) as Box<dyn Mode>)
        });
        registry.register("View", |ctx| {
            Ok(Box::new(ViewMode::new(ctx.options, Arc::clone(ctx.renderer))?) as Box<dyn Mode>)
        });
        registry.register("Callback", |ctx| {
            Ok(Box::new(CallbackMode::new(ctx.options, ctx.callbacks)?) as Box<dyn Mode>)
        });
        registry.register("Redirect", |ctx| {
            Ok(Box::new(RedirectMode::new(ctx.options)?) as Box<dyn Mode>)
        });
        registry
    }

    /// Register (or replace) a mode constructor.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ModeContext<'_>) -> Result<Box<dyn Mode>, MaintenanceError> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.to_ascii_lowercase(), Arc::new(factory));
    }

    /// Construct the mode registered as `name`.
    pub fn build(&self, name: &str, ctx: &ModeContext<'_>) -> Result<Box<dyn Mode>, MaintenanceError> {
        let factory = self.factories.get(&name.to_ascii_lowercase()).ok_or_else(|| {
            MaintenanceError::configuration(format!("unknown maintenance mode `{name}`"))
        })?;
        factory(ctx)
    }
}

/// Resolve the configured status code, or `default` when unset.
pub(crate) fn status_code(code: Option<u16>, default: StatusCode) -> Result<StatusCode, MaintenanceError> {
    match code {
        None => Ok(default),
        Some(code) => StatusCode::from_u16(code)
            .map_err(|_| MaintenanceError::configuration(format!("invalid status code {code}"))),
    }
}

/// Parse configured headers up front so a bad name or value surfaces when the
/// mode is built.
pub(crate) fn parse_headers(headers: &HeaderConfig) -> Result<Vec<(HeaderName, HeaderValue)>, MaintenanceError> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                MaintenanceError::configuration(format!("invalid header name `{name}`"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                MaintenanceError::configuration(format!("invalid value for header `{name}`"))
            })?;
            Ok((name, value))
        })
        .collect()
}

/// Set `headers` on `response`, replacing existing values with the same name.
pub(crate) fn apply_headers(response: &mut Response, headers: &[(HeaderName, HeaderValue)]) {
    let map = response.headers_mut();
    for (name, value) in headers {
        map.insert(name.clone(), value.clone());
    }
}
