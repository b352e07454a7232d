//! An in-memory connection multiplexing many concurrent calls.
//!
//! Each call gets its own pair of channels, its own id and its own
//! cancellation token; nothing mutable is shared between calls. The callee's
//! token is a child of the caller's, so a caller cancelling its call unblocks
//! the callee as well, while the callee failing or being cancelled never
//! reaches past its own call.

use crate::{
    Call, CallId, CallMeta, CallOptions, ChannelReceiver, ChannelSender, Clock, Result, Status,
    Supervisor, channel,
};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A call as opened by the caller: sends `Up`, receives `Down`.
pub type ClientCall<Up, Down, C> = Call<ChannelSender<Up>, ChannelReceiver<Down>, C>;

/// A call as accepted by the callee: receives `Up`, sends `Down`.
pub type ServerCall<Up, Down, C> = Call<ChannelSender<Down>, ChannelReceiver<Up>, C>;

/// Creates a connected caller/callee pair.
///
/// `buffer` bounds in-flight messages per direction of each call.
pub fn connection<Up, Down, C>(
    clock: C,
    buffer: usize,
) -> (Connection<Up, Down, C>, Listener<Up, Down, C>)
where
    Up: Send,
    Down: Send,
    C: Clock,
{
    let (incoming, rx) = mpsc::channel(buffer.max(1));
    (
        Connection {
            incoming,
            next_id: Arc::new(AtomicU64::new(0)),
            clock,
            buffer,
        },
        Listener { rx },
    )
}

/// The caller's end of an in-memory connection. Cheap to clone.
#[derive(Debug)]
pub struct Connection<Up, Down, C> {
    incoming: mpsc::Sender<ServerCall<Up, Down, C>>,
    next_id: Arc<AtomicU64>,
    clock: C,
    buffer: usize,
}

impl<Up, Down, C: Clone> Clone for Connection<Up, Down, C> {
    fn clone(&self) -> Self {
        Self {
            incoming: self.incoming.clone(),
            next_id: Arc::clone(&self.next_id),
            clock: self.clock.clone(),
            buffer: self.buffer,
        }
    }
}

impl<Up, Down, C> Connection<Up, Down, C>
where
    Up: Send,
    Down: Send,
    C: Clock,
{
    /// Opens a new call for `operation`.
    ///
    /// The deadline, if `options` carries a timeout, is computed now and
    /// shared by both sides.
    ///
    /// # Errors
    ///
    /// Fails with `Unavailable` when the listening side has gone away.
    pub async fn open_call(
        &self,
        operation: &str,
        options: &CallOptions,
    ) -> Result<ClientCall<Up, Down, C>> {
        let id = CallId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let deadline = options.deadline(&self.clock);
        let meta = CallMeta::new(id, operation, deadline);

        let (up_tx, up_rx) = channel(self.buffer);
        let (down_tx, down_rx) = channel(self.buffer);

        let caller_token = CancellationToken::new();
        let callee_token = caller_token.child_token();

        let callee = Call::new(
            meta.clone(),
            down_tx,
            up_rx,
            Supervisor::new(deadline, callee_token, self.clock.clone()),
        );
        self.incoming
            .send(callee)
            .await
            .map_err(|_| Status::unavailable("connection closed"))?;

        #[cfg(feature = "tracing")]
        tracing::trace!(call = %id, operation, "call opened");

        Ok(Call::new(
            meta,
            up_tx,
            down_rx,
            Supervisor::new(deadline, caller_token, self.clock.clone()),
        ))
    }
}

/// The callee's end of an in-memory connection.
#[derive(Debug)]
pub struct Listener<Up, Down, C> {
    rx: mpsc::Receiver<ServerCall<Up, Down, C>>,
}

impl<Up, Down, C> Listener<Up, Down, C> {
    /// Waits for the next incoming call. Returns `None` once every
    /// [`Connection`] handle has been dropped.
    pub async fn accept(&mut self) -> Option<ServerCall<Up, Down, C>> {
        self.rx.recv().await
    }
}
