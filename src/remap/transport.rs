//! The real transport a deferred response commits to.
//!
//! # Responsibilities
//! - Define the write-only contract `finalize` replays onto
//! - Provide the HTTP implementation producing an axum `Response`
//!
//! # Design Decisions
//! - Only `finalize` ever touches a transport
//! - Body writes go through a sink that must be closed explicitly
//! - Anything that cannot be expressed on the wire is a `CommitError`

use std::io::{self, Write};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use thiserror::Error;

/// Errors raised while committing a finalized response.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Writing or closing the body sink failed.
    #[error("transport commit failed: {0}")]
    Io(#[from] io::Error),

    /// The status cannot be represented on the wire.
    #[error("status code {0} cannot be sent")]
    InvalidStatus(u16),

    /// The redirect target is not a valid header value.
    #[error("redirect location {0:?} is not a valid header value")]
    InvalidLocation(String),

    /// The transport already carries a committed outcome.
    #[error("response already committed")]
    AlreadyCommitted,
}

/// A body sink handed out by a transport. Bytes reach the client only once the
/// sink is closed.
pub trait BodySink: Write {
    /// Release the sink, completing the body.
    fn close(self) -> io::Result<()>;
}

/// The response object a [`DeferredResponse`](super::DeferredResponse) wraps.
pub trait ResponseTransport {
    type Sink<'a>: BodySink
    where
        Self: 'a;

    fn set_status(&mut self, code: u16) -> Result<(), CommitError>;

    /// Commit an error outcome. `message` replaces the default error body.
    fn send_error(&mut self, code: u16, message: Option<&str>) -> Result<(), CommitError>;

    /// Commit a 302 to `location`.
    fn send_redirect(&mut self, location: &str) -> Result<(), CommitError>;

    /// Drop every header and the status set so far.
    fn reset(&mut self);

    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Acquire the body sink. The caller is responsible for closing it.
    fn body_sink(&mut self) -> Result<Self::Sink<'_>, CommitError>;
}

/// Transport building an in-memory `http` response.
///
/// Nothing is observable to the client until [`into_response`](Self::into_response)
/// hands the finished response to the server.
#[derive(Debug)]
pub struct HttpTransport {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    committed: bool,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            committed: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Convert the committed state into a response for the server.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(Bytes::from(self.body)));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    fn ensure_open(&self) -> Result<(), CommitError> {
        if self.committed {
            return Err(CommitError::AlreadyCommitted);
        }
        Ok(())
    }

    /// Swap in a body the server generated. Headers describing the previous
    /// representation no longer apply to it.
    fn replace_body(&mut self, content_type: Option<&'static str>, body: Vec<u8>) {
        for name in [
            header::CONTENT_LENGTH,
            header::CONTENT_ENCODING,
            header::CONTENT_RANGE,
            header::ETAG,
            header::LAST_MODIFIED,
        ] {
            self.headers.remove(name);
        }
        match content_type {
            Some(ct) => {
                self.headers
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
            }
            None => {
                self.headers.remove(header::CONTENT_TYPE);
            }
        }
        self.body = body;
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn status_from(code: u16) -> Result<StatusCode, CommitError> {
    StatusCode::from_u16(code).map_err(|_| CommitError::InvalidStatus(code))
}

impl ResponseTransport for HttpTransport {
    type Sink<'a> = HttpBodySink<'a>;

    fn set_status(&mut self, code: u16) -> Result<(), CommitError> {
        self.ensure_open()?;
        self.status = status_from(code)?;
        Ok(())
    }

    fn send_error(&mut self, code: u16, message: Option<&str>) -> Result<(), CommitError> {
        self.ensure_open()?;
        let status = status_from(code)?;
        let text = match message {
            Some(msg) => msg.to_string(),
            None => status.canonical_reason().unwrap_or_default().to_string(),
        };
        self.status = status;
        self.headers.remove(header::LOCATION);
        self.replace_body(Some("text/plain; charset=utf-8"), text.into_bytes());
        self.committed = true;
        Ok(())
    }

    fn send_redirect(&mut self, location: &str) -> Result<(), CommitError> {
        self.ensure_open()?;
        let value = HeaderValue::from_str(location)
            .map_err(|_| CommitError::InvalidLocation(location.to_string()))?;
        self.status = StatusCode::FOUND;
        self.headers.insert(header::LOCATION, value);
        self.replace_body(None, Vec::new());
        self.committed = true;
        Ok(())
    }

    fn reset(&mut self) {
        if self.committed {
            return;
        }
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn body_sink(&mut self) -> Result<HttpBodySink<'_>, CommitError> {
        self.ensure_open()?;
        self.headers.remove(header::CONTENT_LENGTH);
        self.body.clear();
        Ok(HttpBodySink {
            body: &mut self.body,
            committed: &mut self.committed,
        })
    }
}

/// Body sink of an [`HttpTransport`]; closing it commits the response.
pub struct HttpBodySink<'a> {
    body: &'a mut Vec<u8>,
    committed: &'a mut bool,
}

impl Write for HttpBodySink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BodySink for HttpBodySink<'_> {
    fn close(self) -> io::Result<()> {
        *self.committed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_uses_reason_phrase_without_message() {
        let mut transport = HttpTransport::new();
        transport.send_error(410, None).unwrap();

        assert_eq!(transport.status(), StatusCode::GONE);
        assert_eq!(transport.body(), b"Gone");
        assert_eq!(
            transport.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert!(transport.is_committed());
    }

    #[test]
    fn test_error_message_replaces_body() {
        let mut transport = HttpTransport::new();
        transport
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        transport.send_error(404, Some("nothing here")).unwrap();

        assert_eq!(transport.body(), b"nothing here");
        assert!(transport.headers().get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_error_drops_stale_representation_headers() {
        let mut transport = HttpTransport::new();
        let headers = transport.headers_mut();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(header::ETAG, HeaderValue::from_static("\"v1\""));
        headers.insert(header::CONTENT_RANGE, HeaderValue::from_static("bytes 0-9/100"));
        headers.insert(header::LAST_MODIFIED, HeaderValue::from_static("Tue, 13 Oct 2026 10:00:00 GMT"));
        headers.insert(header::LOCATION, HeaderValue::from_static("/elsewhere"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        transport.send_error(410, None).unwrap();

        let headers = transport.headers();
        assert!(headers.get(header::CONTENT_ENCODING).is_none());
        assert!(headers.get(header::ETAG).is_none());
        assert!(headers.get(header::CONTENT_RANGE).is_none());
        assert!(headers.get(header::LAST_MODIFIED).is_none());
        assert!(headers.get(header::LOCATION).is_none());
        assert_eq!(headers.get("x-request-id").unwrap(), "abc");
        assert_eq!(transport.body(), b"Gone");
    }

    #[test]
    fn test_redirect_sets_location() {
        let mut transport = HttpTransport::new();
        transport.send_redirect("/x").unwrap();

        let response = transport.into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/x");
    }

    #[test]
    fn test_invalid_values_are_commit_errors() {
        let mut transport = HttpTransport::new();
        assert!(matches!(
            transport.set_status(42),
            Err(CommitError::InvalidStatus(42))
        ));
        assert!(matches!(
            transport.send_redirect("/bad\nlocation"),
            Err(CommitError::InvalidLocation(_))
        ));
        assert!(!transport.is_committed());
    }

    #[test]
    fn test_second_commit_is_rejected() {
        let mut transport = HttpTransport::new();
        transport.send_error(500, None).unwrap();

        assert!(matches!(
            transport.send_redirect("/x"),
            Err(CommitError::AlreadyCommitted)
        ));
        assert!(matches!(
            transport.body_sink(),
            Err(CommitError::AlreadyCommitted)
        ));
    }

    #[test]
    fn test_sink_commits_on_close() {
        let mut transport = HttpTransport::new();
        transport.set_status(201).unwrap();
        let mut sink = transport.body_sink().unwrap();
        sink.write_all(b"created").unwrap();
        sink.close().unwrap();

        assert!(transport.is_committed());
        assert_eq!(transport.status(), StatusCode::CREATED);
        assert_eq!(transport.body(), b"created");
    }

    #[test]
    fn test_reset_clears_headers_and_status() {
        let mut transport = HttpTransport::new();
        transport.set_status(404).unwrap();
        transport
            .headers_mut()
            .insert("x-trace", HeaderValue::from_static("1"));
        transport.reset();

        assert_eq!(transport.status(), StatusCode::OK);
        assert!(transport.headers().is_empty());
    }
}
