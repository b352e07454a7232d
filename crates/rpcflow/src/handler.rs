//! Callee-side contracts for the four interaction shapes.
//!
//! Business logic never touches a [`Call`] directly. It receives its request
//! (or a [`RequestStream`]), produces outbound messages through an
//! [`Emitter`], and returns `Ok` or the [`Status`] it failed with. The serve
//! functions run the handler under the call's supervisor, relay emitted
//! messages to the peer in order, and deliver exactly one terminal status.

use crate::{Call, Clock, Inbound, Lifecycle, Outbound, RecvHalf, Result, SendHalf, Status};
use core::{future::Future, pin::pin};
use tokio::sync::mpsc;

/// Hands outbound messages from a handler to its call.
///
/// Emitting suspends while the peer applies backpressure. Once the peer is
/// gone, every emit fails with `Unavailable` so the handler can stop early.
#[derive(Debug)]
pub struct Emitter<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send> Emitter<T> {
    fn channel() -> (Self, mpsc::Receiver<T>) {
        // One slot: the relay forwards each message before the handler can
        // get further ahead, so backpressure from the peer reaches the
        // handler.
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    pub async fn emit(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| Status::unavailable("response stream closed"))
    }
}

/// The inbound messages of a streaming request, in the order they were sent.
#[derive(Debug)]
pub struct RequestStream<I, C> {
    half: RecvHalf<I, C>,
}

impl<I: Inbound, C: Clock> RequestStream<I, C> {
    /// The next request, or `None` once the caller has finished sending.
    pub async fn next(&mut self) -> Result<Option<I::Item>> {
        self.half.recv().await
    }

    /// How many requests have been received so far.
    pub const fn received(&self) -> usize {
        self.half.received()
    }
}

/// Serves one unary call: `handler` maps the single request to the single
/// response.
pub async fn serve_unary<O, I, C, H, Fut>(mut call: Call<O, I, C>, handler: H) -> Result<()>
where
    O: Outbound,
    I: Inbound,
    C: Clock,
    H: FnOnce(I::Item) -> Fut,
    Fut: Future<Output = Result<O::Item>>,
{
    let outcome = async {
        let request = call.recv().await?.ok_or_else(missing_request)?;
        let response = call.supervise(handler(request)).await?;
        call.send(response).await?;
        call.close_send().await
    }
    .await;
    let Call {
        mut lifecycle,
        mut sender,
        ..
    } = call;
    conclude(&mut lifecycle, &mut sender, outcome).await
}

/// Serves one server-streaming call: `handler` receives the single request
/// and emits any number of responses.
pub async fn serve_server_streaming<O, I, C, H, Fut>(
    mut call: Call<O, I, C>,
    handler: H,
) -> Result<()>
where
    O: Outbound,
    I: Inbound,
    C: Clock,
    H: FnOnce(I::Item, Emitter<O::Item>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let outcome = async {
        let request = call.recv().await?.ok_or_else(missing_request)?;
        let (emitter, rx) = Emitter::channel();
        relay(&mut call.sender, rx, handler(request, emitter)).await?;
        call.sender.close().await
    }
    .await;
    let Call {
        mut lifecycle,
        mut sender,
        ..
    } = call;
    conclude(&mut lifecycle, &mut sender, outcome).await
}

/// Serves one client-streaming call: `handler` consumes the request stream
/// and returns the single aggregate response.
pub async fn serve_client_streaming<O, I, C, H, Fut>(call: Call<O, I, C>, handler: H) -> Result<()>
where
    O: Outbound,
    I: Inbound,
    C: Clock,
    H: FnOnce(RequestStream<I, C>) -> Fut,
    Fut: Future<Output = Result<O::Item>>,
{
    let Call {
        mut lifecycle,
        mut sender,
        receiver,
        ..
    } = call;
    let outcome = async {
        let supervisor = sender.supervisor().clone();
        let response = supervisor
            .supervise(handler(RequestStream { half: receiver }))
            .await?;
        sender.send(response).await?;
        sender.close().await
    }
    .await;
    conclude(&mut lifecycle, &mut sender, outcome).await
}

/// Serves one bidirectional call: `handler` consumes the request stream and
/// emits responses as it goes. The two directions progress independently.
pub async fn serve_bidi<O, I, C, H, Fut>(call: Call<O, I, C>, handler: H) -> Result<()>
where
    O: Outbound,
    I: Inbound,
    C: Clock,
    H: FnOnce(RequestStream<I, C>, Emitter<O::Item>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let Call {
        mut lifecycle,
        mut sender,
        receiver,
        ..
    } = call;
    let outcome = async {
        let (emitter, rx) = Emitter::channel();
        relay(
            &mut sender,
            rx,
            handler(RequestStream { half: receiver }, emitter),
        )
        .await?;
        sender.close().await
    }
    .await;
    conclude(&mut lifecycle, &mut sender, outcome).await
}

fn missing_request() -> Status {
    Status::internal("missing request message")
}

/// Runs `handler` under supervision while forwarding everything it emits to
/// the peer.
///
/// Every message whose emit succeeded reaches the peer before the handler's
/// own outcome, including when that outcome is a failure. Only a failed send
/// or the supervisor firing cuts the relay short.
async fn relay<O, C, Fut>(
    sender: &mut SendHalf<O, C>,
    mut rx: mpsc::Receiver<O::Item>,
    handler: Fut,
) -> Result<()>
where
    O: Outbound,
    C: Clock,
    Fut: Future<Output = Result<()>>,
{
    let supervisor = sender.supervisor().clone();
    let mut handled = pin!(supervisor.supervise(handler));

    let outcome = loop {
        tokio::select! {
            outcome = &mut handled => break outcome,
            item = rx.recv() => match item {
                Some(item) => sender.send(item).await?,
                // Every emitter is gone but the handler is still running.
                None => break handled.await,
            },
        }
    };

    supervisor.check()?;
    // Emitters cloned into other tasks must not keep the relay open.
    rx.close();
    while let Some(item) = rx.recv().await {
        sender.send(item).await?;
    }
    outcome
}

/// Settles the call and, on failure, delivers the status to the peer.
async fn conclude<O, C>(
    lifecycle: &mut Lifecycle,
    sender: &mut SendHalf<O, C>,
    outcome: Result<()>,
) -> Result<()>
where
    O: Outbound,
    C: Clock,
{
    match outcome {
        Ok(()) => lifecycle.complete(),
        Err(status) => {
            let status = lifecycle.fail(status);
            if let Err(_e) = sender.abort(status.clone()).await {
                #[cfg(feature = "tracing")]
                tracing::debug!("could not deliver terminal status to peer: {_e}");
            }
            Err(status)
        }
    }
}
