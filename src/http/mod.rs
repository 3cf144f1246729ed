//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, TraceLayer)
//!     → middleware/remap.rs (StatusRemap buffers the inner response)
//!     → TimeoutLayer → demo handlers
//!     → middleware/remap.rs (RemapFilter settles and commits)
//!     → Send to client
//! ```

pub mod middleware;
pub mod server;

pub use middleware::{RemapError, StatusRemap, StatusRemapLayer};
pub use server::HttpServer;
