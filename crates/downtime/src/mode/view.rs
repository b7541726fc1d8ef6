//! `View` mode: render a template and layout.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

use super::{apply_headers, parse_headers, status_code, Mode};
use crate::config::ModeOptions;
use crate::error::MaintenanceError;
use crate::render::{Renderer, ViewData, ViewSpec};

pub struct ViewMode {
    code: StatusCode,
    view: ViewSpec,
    headers: Vec<(HeaderName, HeaderValue)>,
    renderer: Arc<dyn Renderer>,
}

impl ViewMode {
    pub fn new(options: &ModeOptions, renderer: Arc<dyn Renderer>) -> Result<Self, MaintenanceError> {
        Ok(Self {
            code: status_code(options.code, StatusCode::SERVICE_UNAVAILABLE)?,
            view: ViewSpec::from_options(&options.view),
            headers: parse_headers(&options.headers)?,
            renderer,
        })
    }

    /// Variables exposed to the template.
    fn view_data(&self, request: &Request) -> ViewData {
        let mut data = ViewData::new();
        data.insert("code".to_string(), self.code.as_u16().to_string());
        data.insert("path".to_string(), request.uri().path().to_string());
        data
    }
}

impl Mode for ViewMode {
    fn process(&self, request: &Request) -> Result<Option<Response>, MaintenanceError> {
        let html = self.renderer.render(&self.view, &self.view_data(request))?;

        let mut response = Response::builder()
            .status(self.code)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from(html))?;
        apply_headers(&mut response, &self.headers);
        Ok(Some(response))
    }
}
