//! `Callback` mode: hand the request to a user-supplied function.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;

use super::Mode;
use crate::config::ModeOptions;
use crate::error::MaintenanceError;

/// Returns `Some(response)` to intercept the request, `None` to let it through.
pub type CallbackFn =
    Arc<dyn Fn(&Request) -> Result<Option<Response>, MaintenanceError> + Send + Sync>;

/// Named callbacks the `callback` option can refer to.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, CallbackFn>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.callbacks.keys()).finish()
    }
}

impl CallbackRegistry {
    pub fn register<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: Fn(&Request) -> Result<Option<Response>, MaintenanceError> + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(callback));
    }

    pub fn get(&self, name: &str) -> Option<CallbackFn> {
        self.callbacks.get(name).cloned()
    }
}

pub struct CallbackMode {
    callback: CallbackFn,
}

impl CallbackMode {
    /// Resolve the configured callback. Fails before anything is invoked when
    /// the option is missing or names nothing registered.
    pub fn new(options: &ModeOptions, registry: &CallbackRegistry) -> Result<Self, MaintenanceError> {
        let callback = options
            .callback
            .as_deref()
            .and_then(|name| registry.get(name))
            .ok_or_else(|| {
                MaintenanceError::configuration(format!(
                    "You must pass a valid callable as the `callback` argument (got {:?}).",
                    options.callback
                ))
            })?;
        Ok(Self { callback })
    }
}

impl Mode for CallbackMode {
    fn process(&self, request: &Request) -> Result<Option<Response>, MaintenanceError> {
        (self.callback)(request)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;

    fn options(name: Option<&str>) -> ModeOptions {
        ModeOptions {
            callback: name.map(str::to_string),
            ..ModeOptions::default()
        }
    }

    #[test]
    fn test_returns_callback_response_unchanged() {
        let mut registry = CallbackRegistry::default();
        registry.register("gone", |request: &Request| {
            Ok(Some(
                Response::builder()
                    .status(StatusCode::GONE)
                    .header("x-path", request.uri().path())
                    .body(Body::empty())?,
            ))
        });

        let mode = CallbackMode::new(&options(Some("gone")), &registry).unwrap();
        let request = Request::builder().uri("/old").body(Body::empty()).unwrap();
        let response = mode.process(&request).unwrap().unwrap();

        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(response.headers()["x-path"], "/old");
        // No headers added by the mode itself
        assert_eq!(response.headers().len(), 1);
    }

    #[test]
    fn test_callback_may_pass_through() {
        let mut registry = CallbackRegistry::default();
        registry.register("noop", |_: &Request| Ok(None));

        let mode = CallbackMode::new(&options(Some("noop")), &registry).unwrap();
        assert!(mode.process(&Request::new(Body::empty())).unwrap().is_none());
    }

    #[test]
    fn test_unregistered_callback_fails_without_invoking_anything() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = CallbackRegistry::default();
        registry.register("counted", move |_: &Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });

        for name in [None, Some("missing"), Some("")] {
            match CallbackMode::new(&options(name), &registry) {
                Err(MaintenanceError::Configuration(msg)) => {
                    assert!(msg.contains("valid callable"), "{msg}");
                }
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => panic!("{name:?} must not resolve"),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_errors_propagate() {
        let mut registry = CallbackRegistry::default();
        registry.register("broken", |_: &Request| {
            Err(MaintenanceError::configuration("backend unavailable"))
        });

        let mode = CallbackMode::new(&options(Some("broken")), &registry).unwrap();
        assert!(matches!(
            mode.process(&Request::new(Body::empty())),
            Err(MaintenanceError::Configuration(_))
        ));
    }
}
