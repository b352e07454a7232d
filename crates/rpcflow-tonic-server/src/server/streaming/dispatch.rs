//! Adapters from tonic's method signatures onto the rpcflow serve functions.
//!
//! Each adapter admits the call through the [`CallTracker`], wraps tonic's
//! request and response channels into a supervised [`rpcflow::Call`], and
//! runs the business handler with the serve function for its shape. Statuses
//! cross back into tonic exactly once, when the call settles.
//!
//! Single-response shapes run inline in tonic's handler future; if the client
//! goes away tonic drops that future and the in-flight guard with it.
//! Streaming-response shapes run on a spawned task that feeds the returned
//! response stream.

use crate::server::{
    telemetry::increment_messages_streamed,
    tracker::{CallTracker, InflightGuard},
};
use core::{future::Future, pin::Pin};
use futures::{Stream, TryStreamExt};
use rpcflow::{
    ChannelReceiver, Emitter, Inbound, RequestStream, Single, TokioClock, serve_bidi,
    serve_client_streaming, serve_server_streaming, serve_unary,
};
use rpcflow_tonic_core::transport::{ResponseSink, TonicInbound};
use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming};

/// The response stream type of every server-streaming and bidirectional
/// method.
pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// The inbound side of a client-streaming or bidirectional method.
pub type Requests<T> = RequestStream<TonicInbound<T>, TokioClock>;

pub async fn unary<Req, Resp, H, Fut>(
    tracker: &Arc<CallTracker>,
    operation: &'static str,
    request: Request<Req>,
    handler: H,
) -> Result<Response<Resp>, Status>
where
    Req: Send,
    Resp: Send,
    H: FnOnce(Req) -> Fut,
    Fut: Future<Output = rpcflow::Result<Resp>>,
{
    let context = tracker.begin(operation, request.metadata())?;
    let (sink, responses) = rpcflow::channel(1);
    let (call, guard) = context.into_call(sink, Single::new(request.into_inner()));

    let outcome = serve_unary(call, handler).await;
    single_response(guard, outcome, responses).await
}

pub async fn client_streaming<Req, Resp, H, Fut>(
    tracker: &Arc<CallTracker>,
    operation: &'static str,
    request: Request<Streaming<Req>>,
    handler: H,
) -> Result<Response<Resp>, Status>
where
    Req: Send + 'static,
    Resp: Send,
    H: FnOnce(Requests<Req>) -> Fut,
    Fut: Future<Output = rpcflow::Result<Resp>>,
{
    let context = tracker.begin(operation, request.metadata())?;
    let (sink, responses) = rpcflow::channel(1);
    let (call, guard) = context.into_call(sink, TonicInbound::new(request.into_inner()));

    let outcome = serve_client_streaming(call, handler).await;
    single_response(guard, outcome, responses).await
}

pub fn server_streaming<Req, Resp, H, Fut>(
    tracker: &Arc<CallTracker>,
    operation: &'static str,
    buffer: usize,
    request: Request<Req>,
    handler: H,
) -> Result<Response<ResponseStream<Resp>>, Status>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    H: FnOnce(Req, Emitter<Resp>) -> Fut + Send + 'static,
    Fut: Future<Output = rpcflow::Result<()>> + Send + 'static,
{
    let context = tracker.begin(operation, request.metadata())?;
    let (sink, stream) = ResponseSink::channel(buffer);
    let (call, guard) = context.into_call(sink, Single::new(request.into_inner()));

    spawn_call(operation, guard, serve_server_streaming(call, handler));
    Ok(Response::new(Box::pin(
        stream.inspect_ok(move |_| increment_messages_streamed(operation)),
    )))
}

pub fn bidi<Req, Resp, H, Fut>(
    tracker: &Arc<CallTracker>,
    operation: &'static str,
    buffer: usize,
    request: Request<Streaming<Req>>,
    handler: H,
) -> Result<Response<ResponseStream<Resp>>, Status>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    H: FnOnce(Requests<Req>, Emitter<Resp>) -> Fut + Send + 'static,
    Fut: Future<Output = rpcflow::Result<()>> + Send + 'static,
{
    let context = tracker.begin(operation, request.metadata())?;
    let (sink, stream) = ResponseSink::channel(buffer);
    let (call, guard) = context.into_call(sink, TonicInbound::new(request.into_inner()));

    spawn_call(operation, guard, serve_bidi(call, handler));
    Ok(Response::new(Box::pin(
        stream.inspect_ok(move |_| increment_messages_streamed(operation)),
    )))
}

/// Turns a settled single-response call into tonic's reply.
async fn single_response<Resp: Send>(
    guard: InflightGuard,
    outcome: rpcflow::Result<()>,
    mut responses: ChannelReceiver<Resp>,
) -> Result<Response<Resp>, Status> {
    guard.finish(&outcome);
    outcome?;
    responses
        .recv()
        .await?
        .map(Response::new)
        .ok_or_else(|| Status::internal("call completed without a response"))
}

fn spawn_call<F>(_operation: &'static str, guard: InflightGuard, serve: F)
where
    F: Future<Output = rpcflow::Result<()>> + Send + 'static,
{
    let fut = async move {
        let outcome = serve.await;
        guard.finish(&outcome);
    };

    #[cfg(feature = "tracing")]
    let fut = {
        use tracing::Instrument;
        fut.instrument(tracing::info_span!("streaming", operation = _operation))
    };

    tokio::spawn(fut);
}
