//! Mapping of domain failures onto the fixed [`Code`] enumeration.
//!
//! Business logic reports failures in its own error types. A type opts into a
//! specific code by implementing [`Classify`]; the conversion to [`Status`]
//! happens exactly once, at the boundary between the handler and the call.
//! Errors that carry no classification are reported as [`Code::Internal`] and
//! are never coerced into a domain code.

use crate::{Code, Status};
use core::fmt;

/// A failure that knows which [`Code`] it should surface as.
///
/// The message of the resulting [`Status`] is the error's `Display` output.
///
/// ```
/// use rpcflow::{Classify, Code, map_status};
///
/// #[derive(Debug)]
/// struct Negative(i32);
///
/// impl core::fmt::Display for Negative {
///     fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
///         write!(f, "Received a negative number: {}", self.0)
///     }
/// }
///
/// impl Classify for Negative {
///     fn code(&self) -> Code {
///         Code::InvalidArgument
///     }
/// }
///
/// let status = map_status(&Negative(-2));
/// assert_eq!(status.code(), Code::InvalidArgument);
/// assert_eq!(status.message(), "Received a negative number: -2");
/// ```
pub trait Classify: fmt::Display {
    fn code(&self) -> Code;
}

/// Converts a classified failure into its terminal [`Status`].
pub fn map_status<E: Classify + ?Sized>(err: &E) -> Status {
    Status::new(err.code(), err.to_string())
}

/// Converts a failure with no classification into an `Internal` [`Status`].
pub fn map_unclassified<E: fmt::Display + ?Sized>(err: &E) -> Status {
    Status::internal(err.to_string())
}

impl Status {
    /// Maps a classified failure, taking ownership of it.
    pub fn from_classified<E: Classify>(err: E) -> Self {
        map_status(&err)
    }
}
