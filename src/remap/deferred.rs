//! Deferred response: captures everything downstream code writes and commits
//! it to the real transport in a single step.

use std::io::{self, Write};

use axum::http::HeaderMap;

use super::transport::{BodySink, CommitError, ResponseTransport};

pub const SC_OK: u16 = 200;
pub const SC_FOUND: u16 = 302;
pub const SC_INTERNAL_SERVER_ERROR: u16 = 500;

/// Which terminal action the captured calls ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Write,
    Error,
    Redirect,
}

/// Response stand-in handed to the downstream pipeline.
///
/// Every call that would commit on a real response only updates state here.
/// The one commit happens in `finalize`, which consumes the value.
#[derive(Debug)]
pub struct DeferredResponse<T> {
    transport: T,
    status: u16,
    status_message: Option<String>,
    redirect_location: Option<String>,
    buffer: Vec<u8>,
    disposition: Disposition,
}

impl<T: ResponseTransport> DeferredResponse<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            status: SC_OK,
            status_message: None,
            redirect_location: None,
            buffer: Vec::new(),
            disposition: Disposition::Write,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, code: u16) {
        self.status = code;
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn redirect_location(&self) -> Option<&str> {
        self.redirect_location.as_deref()
    }

    pub fn send_redirect(&mut self, location: impl Into<String>) {
        self.status = SC_FOUND;
        self.redirect_location = Some(location.into());
        self.disposition = Disposition::Redirect;
    }

    /// Record an error status. A message from an earlier call is kept.
    pub fn send_error(&mut self, code: u16) {
        self.status = code;
        self.disposition = Disposition::Error;
    }

    pub fn send_error_with_message(&mut self, code: u16, message: impl Into<String>) {
        self.status = code;
        self.status_message = Some(message.into());
        self.disposition = Disposition::Error;
    }

    /// Discard the buffered body. Status and message are untouched.
    pub fn reset_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Discard the body, status and message, and reset the wrapped transport.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.status = SC_OK;
        self.status_message = None;
        self.disposition = Disposition::Write;
        self.transport.reset();
    }

    /// No-op: nothing may reach the transport before `finalize`.
    pub fn flush_buffer(&mut self) {}

    /// No-op: the buffer grows as needed and is never flushed early.
    pub fn set_buffer_size(&mut self, _size: usize) {}

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn output_stream(&mut self) -> BufferSink<'_> {
        BufferSink {
            buffer: &mut self.buffer,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        self.transport.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.transport.headers_mut()
    }

    /// Commit exactly one outcome to the transport and hand it back.
    ///
    /// A redirect is only sent while the status is still 302; once the status
    /// changed (e.g. remapped) the error branch takes over. A final 200 always
    /// writes the buffered body, whatever call set it.
    pub(crate) fn finalize(self) -> Result<T, CommitError> {
        let Self {
            mut transport,
            status,
            status_message,
            redirect_location,
            buffer,
            disposition,
        } = self;

        match (disposition, redirect_location) {
            (Disposition::Redirect, Some(location)) if status == SC_FOUND => {
                transport.send_redirect(&location)?;
            }
            (Disposition::Error, _) if status != SC_OK => {
                transport.send_error(status, status_message.as_deref())?;
            }
            _ => {
                transport.set_status(status)?;
                let mut sink = transport.body_sink()?;
                let written = sink.write_all(&buffer);
                let closed = sink.close();
                written.and(closed)?;
            }
        }

        Ok(transport)
    }
}

/// Output stream of a [`DeferredResponse`]. Writes land in the in-memory buffer.
pub struct BufferSink<'a> {
    buffer: &'a mut Vec<u8>,
}

impl Write for BufferSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
