//! Tower middleware for the HTTP stack.

pub mod remap;

pub use remap::{RemapError, StatusRemap, StatusRemapLayer};
