//! Shared definitions used by both the client and the server side of the
//! gRPC binding.
//!
//! ## Submodules
//!
//! - [`error`] - Transport-level error type and its mapping to gRPC statuses.
//! - [`types`] - Defaults shared by the server and its clients.

pub mod error;
pub mod types;

pub use error::{Error, Result};
