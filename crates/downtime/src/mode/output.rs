//! `Output` mode: serve the contents of a file.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_core::Stream;
use tokio::io::{AsyncRead, ReadBuf};

use super::{apply_headers, parse_headers, status_code, Mode};
use crate::config::ModeOptions;
use crate::error::MaintenanceError;

/// File served when no `path` is configured, relative to the app root.
pub const DEFAULT_FILE: &str = "maintenance.html";

const CHUNK_SIZE: usize = 8 * 1024;

/// Streams the configured file as the response body.
pub struct OutputMode {
    code: StatusCode,
    path: PathBuf,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl OutputMode {
    pub fn new(options: &ModeOptions, app_root: &Path) -> Result<Self, MaintenanceError> {
        let path = match options.path.as_deref() {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => app_root.join(DEFAULT_FILE),
        };
        Ok(Self {
            code: status_code(options.code, StatusCode::SERVICE_UNAVAILABLE)?,
            path,
            headers: parse_headers(&options.headers)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Mode for OutputMode {
    fn process(&self, _request: &Request) -> Result<Option<Response>, MaintenanceError> {
        let missing = || {
            MaintenanceError::configuration(format!(
                "The file (path : `{}`) does not exist.",
                self.path.display()
            ))
        };

        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(missing()),
            Err(source) => {
                return Err(MaintenanceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let metadata = file.metadata().map_err(|source| MaintenanceError::Io {
            path: self.path.clone(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(missing());
        }

        let body = Body::from_stream(FileBody::new(
            tokio::fs::File::from_std(file),
            metadata.len(),
        ));
        let mut response = Response::builder()
            .status(self.code)
            .header(header::CONTENT_TYPE, content_type(&self.path))
            .header(header::CONTENT_LENGTH, metadata.len())
            .body(body)?;
        apply_headers(&mut response, &self.headers);

        tracing::debug!(path = %self.path.display(), bytes = metadata.len(), "Serving maintenance file");
        Ok(Some(response))
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Byte stream over an open file, capped at the length announced in
/// `Content-Length`.
///
/// The file handle lives inside the stream, so it is closed when the body has
/// been read to the end or dropped early (e.g. the client disconnects). Bytes
/// appended after the file was opened are not sent; a file that shrinks ends
/// the stream with `UnexpectedEof`.
pub struct FileBody<R = tokio::fs::File> {
    reader: Option<R>,
    remaining: u64,
    buf: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> FileBody<R> {
    pub fn new(reader: R, len: u64) -> Self {
        Self {
            reader: Some(reader),
            remaining: len,
            buf: vec![0; CHUNK_SIZE].into_boxed_slice(),
        }
    }
}

impl<R: AsyncRead + Unpin> Stream for FileBody<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.remaining == 0 {
            this.reader = None;
        }
        let Some(reader) = this.reader.as_mut() else {
            return Poll::Ready(None);
        };

        let want = usize::try_from(this.remaining).map_or(this.buf.len(), |r| r.min(this.buf.len()));
        let mut read_buf = ReadBuf::new(&mut this.buf[..want]);
        match Pin::new(reader).poll_read(cx, &mut read_buf) {
            Poll::Ready(Ok(())) => {
                let filled = read_buf.filled();
                if filled.is_empty() {
                    this.reader = None;
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "file shrank while it was being served",
                    ))));
                }
                this.remaining -= filled.len() as u64;
                if this.remaining == 0 {
                    // Release the handle now rather than when the body drops
                    this.reader = None;
                }
                Poll::Ready(Some(Ok(Bytes::copy_from_slice(filled))))
            }
            Poll::Ready(Err(e)) => {
                this.reader = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
