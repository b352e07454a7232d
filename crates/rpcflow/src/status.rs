use core::fmt;

/// A result type whose error is a terminal [`Status`] by default.
pub type Result<T, E = Status> = core::result::Result<T, E>;

/// The fixed set of failure categories a call can terminate with.
///
/// The discriminants match the gRPC status codes so that a binding onto an
/// RPC framework can map them one-to-one, but nothing in this crate depends on
/// a particular framework's code set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Code {
    /// The caller cancelled the call before it completed.
    Cancelled = 1,
    /// A domain precondition was violated. Retrying the same input fails the
    /// same way.
    InvalidArgument = 3,
    /// The call's deadline passed before it reached a terminal state.
    DeadlineExceeded = 4,
    /// An unclassified failure.
    Internal = 13,
    /// The transport failed: the connection dropped or the peer stopped
    /// listening.
    Unavailable = 14,
}

impl Code {
    /// Returns the wire representation of this code.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decodes a wire code. Any value outside the fixed enumeration is
    /// reported as [`Code::Internal`].
    pub const fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Cancelled,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            14 => Self::Unavailable,
            _ => Self::Internal,
        }
    }

    /// Whether a caller may reasonably retry a call that failed with this
    /// code.
    ///
    /// Transport failures and expired deadlines are transient. Invalid
    /// arguments are never retried automatically, and cancellation was the
    /// caller's own decision.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Unavailable | Self::DeadlineExceeded)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal failure of a call: a [`Code`] and a human-readable message.
///
/// A `Status` is produced once per failed call and is reconstructed on the
/// receiving side from exactly the `(code, message)` pair that was sent.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Rebuilds a status from its wire parts.
    pub fn from_parts(code: i32, message: impl Into<String>) -> Self {
        Self::new(Code::from_i32(code), message)
    }

    /// Splits the status into its wire parts.
    pub fn into_parts(self) -> (i32, String) {
        (self.code.as_i32(), self.message)
    }

    pub const fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(feature = "tonic")]
mod tonic_status {
    use super::{Code, Status};

    impl From<Code> for tonic::Code {
        fn from(code: Code) -> Self {
            match code {
                Code::Cancelled => tonic::Code::Cancelled,
                Code::InvalidArgument => tonic::Code::InvalidArgument,
                Code::DeadlineExceeded => tonic::Code::DeadlineExceeded,
                Code::Internal => tonic::Code::Internal,
                Code::Unavailable => tonic::Code::Unavailable,
            }
        }
    }

    impl From<tonic::Code> for Code {
        fn from(code: tonic::Code) -> Self {
            match code {
                tonic::Code::Cancelled => Code::Cancelled,
                tonic::Code::InvalidArgument => Code::InvalidArgument,
                tonic::Code::DeadlineExceeded => Code::DeadlineExceeded,
                tonic::Code::Unavailable => Code::Unavailable,
                _ => Code::Internal,
            }
        }
    }

    impl From<Status> for tonic::Status {
        fn from(status: Status) -> Self {
            tonic::Status::new(status.code.into(), status.message)
        }
    }

    impl From<tonic::Status> for Status {
        fn from(status: tonic::Status) -> Self {
            Status::new(status.code().into(), status.message())
        }
    }
}
