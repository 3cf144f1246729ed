//! Remap filter: run the pipeline once, substitute the status, commit.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::BoxError;
use thiserror::Error;

use super::deferred::{DeferredResponse, SC_INTERNAL_SERVER_ERROR};
use super::mapping::StatusMapping;
use super::transport::{CommitError, ResponseTransport};
use crate::observability::metrics;

/// A failure raised by downstream code while the response was deferred.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline failed: {0}")]
    Failed(#[source] BoxError),

    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }

    /// Build from a payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Failed(_) => "error",
            Self::Panicked(_) => "panic",
        }
    }
}

/// Applies a [`StatusMapping`] to responses produced by a downstream pipeline.
#[derive(Debug, Clone)]
pub struct RemapFilter {
    mapping: Arc<StatusMapping>,
}

impl RemapFilter {
    pub fn new(mapping: Arc<StatusMapping>) -> Self {
        Self { mapping }
    }

    /// Handle one request.
    ///
    /// `pipeline` runs exactly once against a fresh [`DeferredResponse`]
    /// wrapping `transport`. Errors and panics from it are absorbed; only a
    /// failure to commit the final outcome is returned.
    pub fn handle<Req, T, P, E>(
        &self,
        request: &Req,
        transport: T,
        pipeline: P,
    ) -> Result<T, CommitError>
    where
        T: ResponseTransport,
        P: FnOnce(&Req, &mut DeferredResponse<T>) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let mut response = DeferredResponse::new(transport);

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
            pipeline(request, &mut response)
        })) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(PipelineError::failed(err)),
            Err(payload) => Err(PipelineError::from_panic(payload)),
        };

        self.complete(response, outcome)
    }

    /// Settle a response the pipeline has finished with and commit it.
    ///
    /// A failed pipeline becomes a 500 unless it already left a mapped status
    /// behind. The mapping is then applied to whatever status is final.
    pub fn complete<T: ResponseTransport>(
        &self,
        mut response: DeferredResponse<T>,
        outcome: Result<(), PipelineError>,
    ) -> Result<T, CommitError> {
        if let Err(err) = outcome {
            metrics::record_pipeline_failure(err.kind());
            if self.mapping.contains(response.status()) {
                tracing::debug!(status = response.status(), error = %err, "Pipeline failed after setting a mapped status");
            } else {
                tracing::warn!(status = response.status(), error = %err, "Pipeline failed, responding with 500");
                response.send_error(SC_INTERNAL_SERVER_ERROR);
            }
        }

        let status = response.status();
        if let Some(mapped) = self.mapping.get(status) {
            tracing::debug!(from = status, to = mapped, "Remapping response status");
            metrics::record_rewrite(status, mapped);
            response.send_error(mapped);
        }

        response.finalize().inspect_err(|err| {
            metrics::record_commit_failure();
            tracing::error!(error = %err, "Failed to commit response");
        })
    }
}
