//! HTTP status code remapping middleware.
//!
//! Downstream handlers write into a deferred response; once they finish, the
//! configured mapping decides the final status and exactly one outcome is
//! committed.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod remap;

pub use config::schema::ServerConfig;
pub use http::{HttpServer, StatusRemapLayer};
pub use lifecycle::Shutdown;
pub use remap::{DeferredResponse, RemapFilter, SharedMapping, StatusMapping};
