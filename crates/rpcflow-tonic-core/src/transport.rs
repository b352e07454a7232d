//! rpcflow message channels over tonic HTTP/2 streams.
//!
//! ## Caller side
//!
//! [`GrpcConnection`] opens every call, whatever its shape, as one generic
//! HTTP/2 stream: requests are fed through a bounded channel into the request
//! body, and responses are decoded lazily from the response body. The
//! interaction shape is enforced by the rpcflow driver that runs the call,
//! not by the transport. A call's timeout travels to the server as the
//! `grpc-timeout` header and is enforced locally by the call's supervisor.
//!
//! ## Callee side
//!
//! [`TonicInbound`] reads the request stream tonic has already decoded, and
//! [`ResponseSink`] feeds the response stream tonic encodes. A failure
//! delivered through the sink becomes the call's trailing `grpc-status`.

use crate::common::{error, types::DEFAULT_STREAM_BUFFER};
use core::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};
use futures::Stream;
use portable_atomic::{AtomicU64, Ordering};
use rpcflow::{
    Call, CallId, CallMeta, CallOptions, Inbound, Outbound, Result, Status, Supervisor,
    TokioClock,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::{sync::CancellationToken, task::AbortOnDropHandle};
use tonic::{
    Request, Response, Streaming,
    client::Grpc,
    codec::CompressionEncoding,
    codegen::http::uri::PathAndQuery,
    metadata::MetadataMap,
    transport::{Channel, Endpoint},
};

/// The metadata key carrying a call's remaining time budget.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// A call opened over a [`GrpcConnection`].
pub type GrpcCall<Req, Resp> = Call<RequestSink<Req>, ResponseSource<Resp>>;

/// Items of a server's response stream, as tonic expects them.
pub type ResponseItem<T> = core::result::Result<T, tonic::Status>;


type Opening<T> = AbortOnDropHandle<core::result::Result<Response<Streaming<T>>, tonic::Status>>;

/// A client connection that multiplexes many concurrent calls over one HTTP/2
/// channel. Cheap to clone; clones share the channel and the call id
/// sequence.
#[derive(Clone, Debug)]
pub struct GrpcConnection {
    grpc: Grpc<Channel>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

impl GrpcConnection {
    /// Connects to `endpoint`, e.g. `http://127.0.0.1:50051`.
    pub async fn connect(endpoint: impl Into<String>) -> error::Result<Self> {
        let endpoint = Endpoint::from_shared(endpoint.into()).map_err(|e| {
            error::Error::InvalidEndpoint {
                reason: e.to_string(),
            }
        })?;
        let channel = endpoint.connect().await?;
        Ok(Self::new(channel))
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            grpc: Grpc::new(channel),
            next_id: Arc::new(AtomicU64::new(0)),
            buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Bounds the number of requests buffered per call before a send waits.
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Compresses requests with `encoding`.
    #[must_use]
    pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
        self.grpc = self.grpc.send_compressed(encoding);
        self
    }

    /// Advertises that responses compressed with `encoding` are accepted.
    #[must_use]
    pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
        self.grpc = self.grpc.accept_compressed(encoding);
        self
    }

    /// Opens a call to the method at `path` (e.g.
    /// `/calculator.CalculatorService/Sum`).
    ///
    /// The HTTP/2 stream is started on a background task owned by the call.
    /// Dropping the call resets the stream, which the server observes as a
    /// cancellation.
    pub fn open_call<Req, Resp>(
        &self,
        path: &'static str,
        options: &CallOptions,
    ) -> GrpcCall<Req, Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let id = CallId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let deadline = options.deadline(&TokioClock);

        #[cfg(feature = "tracing")]
        tracing::debug!(call = %id, path, timeout = ?options.timeout(), "opening call");

        let (tx, rx) = mpsc::channel(self.buffer);
        let mut request = Request::new(ReceiverStream::new(rx));
        if let Some(timeout) = options.timeout() {
            request.set_timeout(timeout);
        }

        let mut grpc = self.grpc.clone();
        let opening = tokio::spawn(async move {
            grpc.ready().await.map_err(|e| {
                tonic::Status::unavailable(format!("Service was not ready: {e}"))
            })?;
            let codec = tonic_prost::ProstCodec::<Req, Resp>::default();
            grpc.streaming(request, PathAndQuery::from_static(path), codec)
                .await
        });

        Call::new(
            CallMeta::new(id, path, deadline),
            RequestSink { tx: Some(tx) },
            ResponseSource::Pending(AbortOnDropHandle::new(opening)),
            Supervisor::new(deadline, CancellationToken::new(), TokioClock),
        )
    }
}

/// The request body of a client call.
#[derive(Debug)]
pub struct RequestSink<T> {
    tx: Option<mpsc::Sender<T>>,
}

impl<T: Send> Outbound for RequestSink<T> {
    type Item = T;

    async fn send(&mut self, item: T) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Err(Status::unavailable("request stream already closed"));
        };
        tx.send(item)
            .await
            .map_err(|_| Status::unavailable("server stopped reading requests"))
    }

    async fn close(&mut self) -> Result<()> {
        // Ending the body stream half-closes the HTTP/2 stream.
        self.tx = None;
        Ok(())
    }

    async fn fail(&mut self, _status: Status) -> Result<()> {
        // Clients cannot send a status. Dropping the call resets the stream.
        self.tx = None;
        Ok(())
    }
}

/// The response side of a client call: first the pending response headers,
/// then the decoded message stream.
pub enum ResponseSource<T> {
    Pending(Opening<T>),
    Open(Streaming<T>),
    Done,
}

impl<T> fmt::Debug for ResponseSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Pending(_) => "Pending",
            Self::Open(_) => "Open",
            Self::Done => "Done",
        };
        f.debug_tuple("ResponseSource").field(&state).finish()
    }
}

impl<T: Send + 'static> Inbound for ResponseSource<T> {
    type Item = T;

    async fn recv(&mut self) -> Result<Option<T>> {
        loop {
            match self {
                Self::Pending(opening) => {
                    let response = match opening.await {
                        Ok(Ok(response)) => response,
                        Ok(Err(status)) => {
                            *self = Self::Done;
                            return Err(status.into());
                        }
                        Err(e) => {
                            *self = Self::Done;
                            return Err(Status::internal(format!("call task failed: {e}")));
                        }
                    };
                    *self = Self::Open(response.into_inner());
                }
                Self::Open(stream) => {
                    return match stream.message().await {
                        Ok(Some(message)) => Ok(Some(message)),
                        Ok(None) => {
                            *self = Self::Done;
                            Ok(None)
                        }
                        Err(status) => {
                            *self = Self::Done;
                            Err(status.into())
                        }
                    };
                }
                Self::Done => return Ok(None),
            }
        }
    }
}

/// The request stream of a server call, as decoded by tonic.
pub struct TonicInbound<T>(Streaming<T>);

impl<T> fmt::Debug for TonicInbound<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicInbound").finish_non_exhaustive()
    }
}

impl<T> TonicInbound<T> {
    pub const fn new(stream: Streaming<T>) -> Self {
        Self(stream)
    }
}

impl<T: Send + 'static> Inbound for TonicInbound<T> {
    type Item = T;

    async fn recv(&mut self) -> Result<Option<T>> {
        self.0.message().await.map_err(Status::from)
    }
}

type Trailer = core::result::Result<(), tonic::Status>;

/// Feeds the response stream of a server call.
///
/// Closing ends the stream with an `OK` status. Failing ends it with the
/// given status. Dropping the sink without either ends it with
/// `UNAVAILABLE`, never with a false `OK`. The terminal status travels apart
/// from the responses, so a full buffer cannot hold it back.
#[derive(Debug)]
pub struct ResponseSink<T> {
    tx: Option<mpsc::Sender<T>>,
    trailer: Option<oneshot::Sender<Trailer>>,
}

impl<T> ResponseSink<T> {
    /// Creates a sink and the stream tonic should send to the client.
    pub fn channel(buffer: usize) -> (Self, ResponseStream<T>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (trailer_tx, trailer_rx) = oneshot::channel();
        (
            Self {
                tx: Some(tx),
                trailer: Some(trailer_tx),
            },
            ResponseStream {
                items: ReceiverStream::new(rx),
                trailer: Some(trailer_rx),
            },
        )
    }

    fn finish(&mut self, trailer: Trailer) {
        self.tx = None;
        if let Some(tx) = self.trailer.take() {
            // The client may already be gone.
            let _ = tx.send(trailer);
        }
    }
}

impl<T: Send> Outbound for ResponseSink<T> {
    type Item = T;

    async fn send(&mut self, item: T) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Err(Status::unavailable("response stream already closed"));
        };
        tx.send(item)
            .await
            .map_err(|_| Status::unavailable("client stopped reading responses"))
    }

    async fn close(&mut self) -> Result<()> {
        self.finish(Ok(()));
        Ok(())
    }

    async fn fail(&mut self, status: Status) -> Result<()> {
        self.finish(Err(status.into()));
        Ok(())
    }
}

/// The response stream handed to tonic by a server-streaming or
/// bidirectional method.
///
/// Yields every response the sink sent, in order, followed by the sink's
/// terminal status when it is not `OK`.
#[derive(Debug)]
pub struct ResponseStream<T> {
    items: ReceiverStream<T>,
    trailer: Option<oneshot::Receiver<Trailer>>,
}

impl<T> Stream for ResponseStream<T> {
    type Item = ResponseItem<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(item) = ready!(Pin::new(&mut self.items).poll_next(cx)) {
            return Poll::Ready(Some(Ok(item)));
        }
        let Some(trailer) = self.trailer.as_mut() else {
            return Poll::Ready(None);
        };
        let outcome = ready!(Pin::new(trailer).poll(cx));
        self.trailer = None;
        Poll::Ready(match outcome {
            Ok(Ok(())) => None,
            Ok(Err(status)) => Some(Err(status)),
            Err(_) => Some(Err(tonic::Status::unavailable(
                "response stream dropped before completion",
            ))),
        })
    }
}

/// Parses the `grpc-timeout` header: up to eight ASCII digits followed by one
/// unit (`H`ours, `M`inutes, `S`econds, `m`illis, `u`micros, `n`anos).
///
/// Returns `None` when the header is absent or malformed; a malformed
/// timeout is treated as no timeout.
pub fn grpc_timeout(metadata: &MetadataMap) -> Option<Duration> {
    let value = metadata.get(GRPC_TIMEOUT_HEADER)?.to_str().ok()?;
    let (digits, unit) = value.split_at_checked(value.len().checked_sub(1)?)?;
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}
