//! One direction of a call's message channel.
//!
//! [`Outbound`] and [`Inbound`] are the only things the protocol layer needs
//! from a transport. Messages in one direction arrive in the order they were
//! sent, and the receiving side can always tell a clean end-of-stream
//! (`Ok(None)`) from a failed one (`Err(status)`).
//!
//! The in-memory implementation here carries messages over a bounded Tokio
//! channel and the terminal status over a separate oneshot, the way HTTP/2
//! carries gRPC trailers after the body. Messages are never reordered behind
//! the trailer: the receiver only looks at it once every buffered message has
//! been drained.

use crate::{Result, Status};
use core::future::Future;
use tokio::sync::{mpsc, oneshot};

/// The sending side of one direction of a call.
pub trait Outbound: Send {
    type Item: Send;

    /// Sends one message. May suspend while the peer applies backpressure.
    ///
    /// Fails with `Unavailable` once the peer has stopped receiving.
    fn send(&mut self, item: Self::Item) -> impl Future<Output = Result<()>> + Send;

    /// Signals a clean end-of-stream. Idempotent.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Ends the stream with `status` instead of a clean end.
    ///
    /// Transports that cannot carry a status in this direction end the stream
    /// in whatever way their peer recognizes as an abort.
    fn fail(&mut self, status: Status) -> impl Future<Output = Result<()>> + Send;
}

/// The receiving side of one direction of a call.
pub trait Inbound: Send {
    type Item: Send;

    /// Waits for the next message.
    ///
    /// Returns `Ok(None)` on the peer's clean end-of-stream and on every call
    /// after that.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Self::Item>>> + Send;
}

type Trailer = Result<()>;

/// Creates an in-memory channel for one direction of a call.
///
/// `buffer` bounds the number of in-flight messages before `send` suspends. A
/// buffer of zero is treated as one.
pub fn channel<T: Send>(buffer: usize) -> (ChannelSender<T>, ChannelReceiver<T>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let (trailer_tx, trailer_rx) = oneshot::channel();
    (
        ChannelSender {
            tx: Some(tx),
            trailer: Some(trailer_tx),
        },
        ChannelReceiver {
            rx,
            trailer: Some(trailer_rx),
        },
    )
}

/// The sending half of an in-memory channel.
///
/// Dropping it without calling [`Outbound::close`] or [`Outbound::fail`]
/// surfaces as `Unavailable` on the receiving side.
#[derive(Debug)]
pub struct ChannelSender<T> {
    tx: Option<mpsc::Sender<T>>,
    trailer: Option<oneshot::Sender<Trailer>>,
}

impl<T> ChannelSender<T> {
    fn finish(&mut self, trailer: Trailer) {
        // Drop the message sender first so the receiver drains what is
        // buffered before it looks at the trailer.
        self.tx = None;
        if let Some(tx) = self.trailer.take() {
            // The peer may already be gone. There is nobody left to tell.
            let _ = tx.send(trailer);
        }
    }

    pub const fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

impl<T: Send> Outbound for ChannelSender<T> {
    type Item = T;

    async fn send(&mut self, item: T) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Err(Status::unavailable("send direction already closed"));
        };
        tx.send(item)
            .await
            .map_err(|_| Status::unavailable("peer stopped receiving"))
    }

    async fn close(&mut self) -> Result<()> {
        self.finish(Ok(()));
        Ok(())
    }

    async fn fail(&mut self, status: Status) -> Result<()> {
        self.finish(Err(status));
        Ok(())
    }
}

/// The receiving half of an in-memory channel.
#[derive(Debug)]
pub struct ChannelReceiver<T> {
    rx: mpsc::Receiver<T>,
    trailer: Option<oneshot::Receiver<Trailer>>,
}

impl<T: Send> Inbound for ChannelReceiver<T> {
    type Item = T;

    async fn recv(&mut self) -> Result<Option<T>> {
        if let Some(item) = self.rx.recv().await {
            return Ok(Some(item));
        }
        let Some(trailer) = self.trailer.take() else {
            return Ok(None);
        };
        match trailer.await {
            Ok(Ok(())) => Ok(None),
            Ok(Err(status)) => Err(status),
            Err(_) => Err(Status::unavailable(
                "peer dropped the stream without closing it",
            )),
        }
    }
}

/// An [`Inbound`] that yields one message and then a clean end-of-stream.
///
/// Useful where a transport hands over an already-decoded single request.
#[derive(Debug)]
pub struct Single<T>(Option<T>);

impl<T> Single<T> {
    pub const fn new(item: T) -> Self {
        Self(Some(item))
    }
}

impl<T: Send> Inbound for Single<T> {
    type Item = T;

    async fn recv(&mut self) -> Result<Option<T>> {
        Ok(self.0.take())
    }
}
