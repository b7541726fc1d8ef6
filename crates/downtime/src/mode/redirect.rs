//! `Redirect` mode: send the client to a maintenance page elsewhere.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

use super::{apply_headers, parse_headers, status_code, Mode};
use crate::config::ModeOptions;
use crate::error::MaintenanceError;

const DEFAULT_LOCATION: &str = "/maintenance.html";

pub struct RedirectMode {
    code: StatusCode,
    url: Option<HeaderValue>,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl RedirectMode {
    pub fn new(options: &ModeOptions) -> Result<Self, MaintenanceError> {
        let url = match options.url.as_deref() {
            Some(url) if !url.is_empty() => Some(HeaderValue::from_str(url).map_err(|_| {
                MaintenanceError::configuration(format!("invalid redirect url `{url}`"))
            })?),
            _ => None,
        };
        Ok(Self {
            code: status_code(options.code, StatusCode::TEMPORARY_REDIRECT)?,
            url,
            headers: parse_headers(&options.headers)?,
        })
    }

    /// `<scheme>://<host>/maintenance.html` for the requested host, or a
    /// relative location when the request carries no host.
    fn default_location(request: &Request) -> HeaderValue {
        let host = request
            .uri()
            .authority()
            .map(|a| a.as_str())
            .or_else(|| request.headers().get(header::HOST).and_then(|h| h.to_str().ok()));
        let scheme = request.uri().scheme_str().unwrap_or("http");

        host.and_then(|host| HeaderValue::from_str(&format!("{scheme}://{host}{DEFAULT_LOCATION}")).ok())
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_LOCATION))
    }
}

impl Mode for RedirectMode {
    fn process(&self, request: &Request) -> Result<Option<Response>, MaintenanceError> {
        let location = self
            .url
            .clone()
            .unwrap_or_else(|| Self::default_location(request));

        let mut response = Response::builder()
            .status(self.code)
            .header(header::LOCATION, location)
            .body(Body::empty())?;
        apply_headers(&mut response, &self.headers);
        Ok(Some(response))
    }
}
