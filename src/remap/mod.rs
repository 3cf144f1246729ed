//! Status remapping core.
//!
//! # Data Flow
//! ```text
//! request
//!     → filter.rs (one RemapFilter per mapping snapshot)
//!     → deferred.rs (DeferredResponse captures status, redirect, body)
//!     → downstream pipeline writes into the DeferredResponse
//!     → filter.rs (500 on failure, mapping applied to the final status)
//!     → deferred.rs finalize (exactly one commit)
//!     → transport.rs (HttpTransport → axum Response)
//! ```
//!
//! # Design Decisions
//! - Nothing reaches the transport before `finalize`
//! - The mapping is immutable; reloads swap the whole table (mapping.rs)
//! - Pipeline failures are absorbed; only commit failures escape

pub mod deferred;
pub mod filter;
pub mod mapping;
pub mod transport;

pub use deferred::{BufferSink, DeferredResponse};
pub use filter::{PipelineError, RemapFilter};
pub use mapping::{SharedMapping, StatusMapping};
pub use transport::{BodySink, CommitError, HttpTransport, ResponseTransport};
