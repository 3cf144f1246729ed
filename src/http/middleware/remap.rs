//! Status remapping middleware.
//!
//! Buffers the inner service's whole response into a [`DeferredResponse`],
//! then lets [`RemapFilter`] decide the final status before anything is
//! returned to the server.

use std::future::Future;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap, Request, Response, StatusCode};
use axum::BoxError;
use futures_util::FutureExt;
use thiserror::Error;
use tower::{Layer, Service};

use crate::remap::{
    CommitError, DeferredResponse, HttpTransport, PipelineError, RemapFilter, SharedMapping,
};

/// Errors surfaced by [`StatusRemap`] to the hosting server.
#[derive(Debug, Error)]
pub enum RemapError {
    /// The wrapped service refused to become ready.
    #[error("inner service not ready: {0}")]
    NotReady(#[source] BoxError),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Layer that applies the shared status mapping to every response.
///
/// # Example
///
/// ```ignore
/// use status_remap::http::middleware::StatusRemapLayer;
/// use status_remap::remap::{SharedMapping, StatusMapping};
///
/// let mapping = SharedMapping::new(StatusMapping::from_pairs([("404", "410")]));
/// let service = tower::ServiceBuilder::new()
///     .layer(StatusRemapLayer::new(mapping, 1024 * 1024))
///     .service(inner);
/// ```
#[derive(Debug, Clone)]
pub struct StatusRemapLayer {
    mapping: SharedMapping,
    max_body_bytes: usize,
}

impl StatusRemapLayer {
    pub fn new(mapping: SharedMapping, max_body_bytes: usize) -> Self {
        Self {
            mapping,
            max_body_bytes,
        }
    }
}

impl<S> Layer<S> for StatusRemapLayer {
    type Service = StatusRemap<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StatusRemap {
            inner,
            mapping: self.mapping.clone(),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Service running its inner service as the remap pipeline.
#[derive(Debug, Clone)]
pub struct StatusRemap<S> {
    inner: S,
    mapping: SharedMapping,
    max_body_bytes: usize,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for StatusRemap<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Error: Into<BoxError> + Send,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: HttpBody<Data = axum::body::Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = RemapError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|e| RemapError::NotReady(e.into()))
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let filter = RemapFilter::new(self.mapping.load());
        let max_body_bytes = self.max_body_bytes;
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        Box::pin(async move {
            let mut response = DeferredResponse::new(HttpTransport::new());

            // Settle the inner result before awaiting the body so no `S::Error`
            // is held across an await point.
            let inner_result = match std::panic::catch_unwind(AssertUnwindSafe(|| inner.call(request))) {
                Ok(future) => match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(Ok(inner_response)) => Ok(inner_response),
                    Ok(Err(e)) => Err(PipelineError::failed(e)),
                    Err(payload) => Err(PipelineError::from_panic(payload)),
                },
                Err(payload) => Err(PipelineError::from_panic(payload)),
            };

            let outcome = match inner_result {
                Ok(inner_response) => replay(inner_response, &mut response, max_body_bytes).await,
                Err(e) => Err(e),
            };

            if let Err(e) = &outcome {
                tracing::debug!(method = %method, path = %path, error = %e, "Inner service failed");
            }

            let transport = filter.complete(response, outcome)?;
            tracing::trace!(method = %method, path = %path, status = %transport.status(), "Response committed");
            Ok(transport.into_response())
        })
    }
}

/// Write a finished inner response into the deferred response.
///
/// The status goes through `set_status`, or `send_redirect` for a 302 with a
/// usable `Location`. Framing headers are dropped; the transport sets its own.
/// A replayed redirect keeps its target only in the deferred state, so the
/// `Location` header reaches the client only if the redirect is committed.
async fn replay<B>(
    inner_response: Response<B>,
    response: &mut DeferredResponse<HttpTransport>,
    max_body_bytes: usize,
) -> Result<(), PipelineError>
where
    B: HttpBody<Data = axum::body::Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = inner_response.into_parts();

    let location = parts
        .headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let redirect = match location {
        Some(location) if parts.status == StatusCode::FOUND => {
            response.send_redirect(location);
            true
        }
        _ => {
            response.set_status(parts.status.as_u16());
            false
        }
    };

    copy_headers(&parts.headers, response.headers_mut());
    if redirect {
        response.headers_mut().remove(header::LOCATION);
    }

    let bytes = axum::body::to_bytes(Body::new(body), max_body_bytes)
        .await
        .map_err(PipelineError::failed)?;
    response
        .output_stream()
        .write_all(&bytes)
        .map_err(PipelineError::failed)?;
    Ok(())
}

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}
