//! Error types for the gRPC binding.
//!
//! Call outcomes are always an [`rpcflow::Status`]; this enum covers what can
//! go wrong around a call: connecting, wiring streams together, and a server
//! that refuses new calls while it drains.
//!
//! ## Error Cases
//! - `ChannelError`: An internal handoff between tasks failed.
//! - `InvalidEndpoint`: The address to connect to could not be parsed.
//! - `Transport`: The HTTP/2 connection could not be established.
//! - `Call`: A call ended with a failure status.
//! - `ServiceShutdown`: A call arrived while the server was shutting down.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the gRPC binding.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Internal channel send/receive failure (e.g., a task that went away).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The endpoint URI was malformed.
    #[error("Invalid endpoint: {reason}")]
    InvalidEndpoint { reason: String },

    /// Connecting to the server failed.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The call itself failed.
    #[error("{0}")]
    Call(#[from] rpcflow::Status),

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for rpcflow::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelError { context } => Self::internal(format!("Channel error: {context}")),
            Error::InvalidEndpoint { reason } => Self::invalid_argument(reason),
            Error::Transport(e) => Self::unavailable(format!("Transport error: {e}")),
            Error::Call(status) => status,
            Error::ServiceShutdown => Self::unavailable("Service is shutting down"),
        }
    }
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        rpcflow::Status::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcflow::Code;

    #[test]
    fn shutdown_is_retryable() {
        let status = rpcflow::Status::from(Error::ServiceShutdown);
        assert_eq!(status.code(), Code::Unavailable);
        assert!(status.code().is_retryable());
    }

    #[test]
    fn call_failures_pass_through_unchanged() {
        let failure = rpcflow::Status::invalid_argument("Received a negative number: -2");
        let status = tonic::Status::from(Error::Call(failure));
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(status.message(), "Received a negative number: -2");
    }

    #[test]
    fn error_is_reachable_from_the_crate_root() {
        let err: crate::Error = crate::error::Error::ServiceShutdown;
        let result: crate::Result<()> = Err(err);
        let status = tonic::Status::from(result.unwrap_err());
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }
}
