use crate::{
    CallState, CancelHandle, Clock, Code, Deadline, Inbound, Lifecycle, Outbound, Result, Status,
    Supervisor, TokioClock,
};
use core::{fmt, future::Future, time::Duration};
use std::sync::Arc;

/// Identifies a call on its connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallId(u64);

impl CallId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable facts about a call, fixed when it is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallMeta {
    id: CallId,
    operation: Arc<str>,
    deadline: Option<Deadline>,
}

impl CallMeta {
    pub fn new(id: CallId, operation: impl Into<Arc<str>>, deadline: Option<Deadline>) -> Self {
        Self {
            id,
            operation: operation.into(),
            deadline,
        }
    }

    pub const fn id(&self) -> CallId {
        self.id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub const fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }
}

/// Caller-side policy for one call.
///
/// - `timeout`: converted to an absolute [`Deadline`] when the call is opened.
/// - `pacing`: a pause after each outbound message of a streaming producer.
///   Zero means no pause.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallOptions {
    timeout: Option<Duration>,
    pacing: Duration,
}

impl CallOptions {
    pub const fn new() -> Self {
        Self {
            timeout: None,
            pacing: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub const fn pacing(&self) -> Duration {
        self.pacing
    }

    /// The absolute deadline for a call opened now.
    pub fn deadline<C: Clock>(&self, clock: &C) -> Option<Deadline> {
        self.timeout.map(|timeout| Deadline::after(clock, timeout))
    }
}

/// The outbound direction of a call, with its own copy of the supervisor.
///
/// Owned separately from the inbound direction so the two can progress on
/// different tasks without sharing state.
#[derive(Debug)]
pub struct SendHalf<O, C = TokioClock> {
    outbound: O,
    supervisor: Supervisor<C>,
    open: bool,
    sent: usize,
}

impl<O: Outbound, C: Clock> SendHalf<O, C> {
    pub(crate) const fn new(outbound: O, supervisor: Supervisor<C>) -> Self {
        Self {
            outbound,
            supervisor,
            open: true,
            sent: 0,
        }
    }

    pub const fn is_open(&self) -> bool {
        self.open
    }

    pub const fn sent(&self) -> usize {
        self.sent
    }

    pub const fn supervisor(&self) -> &Supervisor<C> {
        &self.supervisor
    }

    /// Sends one message under supervision.
    ///
    /// An `Unavailable` failure means the peer stopped receiving; the
    /// direction is closed locally and no further sends are attempted.
    pub async fn send(&mut self, item: O::Item) -> Result<()> {
        if !self.open {
            return Err(Status::unavailable("send direction already closed"));
        }
        match self.supervisor.supervise(self.outbound.send(item)).await {
            Ok(()) => {
                self.sent += 1;
                Ok(())
            }
            Err(status) => {
                if status.code() == Code::Unavailable {
                    self.open = false;
                }
                Err(status)
            }
        }
    }

    /// Signals a clean end of this direction. A no-op once closed.
    pub async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.supervisor.supervise(self.outbound.close()).await
    }

    /// Ends this direction with `status`.
    ///
    /// Not supervised: the status must still reach the peer when the failure
    /// is this call's own cancellation or expiry.
    pub async fn abort(&mut self, status: Status) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.outbound.fail(status).await
    }

    /// Pauses between sends. Takes `&mut self` so the send loop stays `Send`
    /// without requiring a shareable transport.
    pub async fn pause(&mut self, interval: Duration) -> Result<()> {
        self.supervisor.pause(interval).await
    }
}

/// The inbound direction of a call.
///
/// After a clean end-of-stream every receive returns `Ok(None)`. After a
/// failure every receive returns that same failure.
#[derive(Debug)]
pub struct RecvHalf<I, C = TokioClock> {
    inbound: I,
    supervisor: Supervisor<C>,
    open: bool,
    failure: Option<Status>,
    received: usize,
}

impl<I: Inbound, C: Clock> RecvHalf<I, C> {
    pub(crate) const fn new(inbound: I, supervisor: Supervisor<C>) -> Self {
        Self {
            inbound,
            supervisor,
            open: true,
            failure: None,
            received: 0,
        }
    }

    pub const fn is_open(&self) -> bool {
        self.open
    }

    pub const fn received(&self) -> usize {
        self.received
    }

    pub async fn recv(&mut self) -> Result<Option<I::Item>> {
        if let Some(status) = &self.failure {
            return Err(status.clone());
        }
        if !self.open {
            return Ok(None);
        }
        match self.supervisor.supervise(self.inbound.recv()).await {
            Ok(Some(item)) => {
                self.received += 1;
                Ok(Some(item))
            }
            Ok(None) => {
                self.open = false;
                Ok(None)
            }
            Err(status) => {
                self.open = false;
                self.failure = Some(status.clone());
                Err(status)
            }
        }
    }
}

/// One RPC invocation as seen from one side.
///
/// A `Call` owns its [`Lifecycle`], both directions, and the supervisor that
/// enforces cancellation and the deadline. Any failed operation settles the
/// lifecycle, and every operation after that returns the same status, so a
/// call can only ever produce one terminal outcome.
///
/// The one failure that does not settle the call is a send rejected with
/// `Unavailable`: it means the peer stopped receiving, which closes the send
/// direction and leaves the outcome to whatever the peer reports on the
/// receive direction.
#[derive(Debug)]
pub struct Call<O, I, C = TokioClock> {
    pub(crate) meta: CallMeta,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) sender: SendHalf<O, C>,
    pub(crate) receiver: RecvHalf<I, C>,
}

impl<O, I, C> Call<O, I, C>
where
    O: Outbound,
    I: Inbound,
    C: Clock,
{
    pub fn new(meta: CallMeta, outbound: O, inbound: I, supervisor: Supervisor<C>) -> Self {
        Self {
            meta,
            lifecycle: Lifecycle::new(),
            sender: SendHalf::new(outbound, supervisor.clone()),
            receiver: RecvHalf::new(inbound, supervisor),
        }
    }

    pub const fn meta(&self) -> &CallMeta {
        &self.meta
    }

    pub const fn state(&self) -> CallState {
        self.lifecycle.state()
    }

    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub const fn supervisor(&self) -> &Supervisor<C> {
        &self.sender.supervisor
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.sender.supervisor.cancel_handle()
    }

    fn settled(&self) -> Result<()> {
        match self.lifecycle.failure() {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    pub async fn send(&mut self, item: O::Item) -> Result<()> {
        self.settled()?;
        if !self.lifecycle.is_send_open() {
            return Err(Status::unavailable("send direction already closed"));
        }
        match self.sender.send(item).await {
            Ok(()) => Ok(()),
            Err(status) if !self.sender.is_open() => {
                self.lifecycle.close_send();
                Err(status)
            }
            Err(status) => Err(self.lifecycle.fail(status)),
        }
    }

    /// Sends one message, treating a peer that stopped receiving as the end of
    /// the send phase. Returns whether the send direction is still open.
    pub(crate) async fn offer(&mut self, item: O::Item) -> Result<bool> {
        match self.send(item).await {
            Ok(()) => Ok(true),
            Err(_) if !self.lifecycle.is_settled() && !self.sender.is_open() => Ok(false),
            Err(status) => Err(status),
        }
    }

    pub async fn close_send(&mut self) -> Result<()> {
        self.settled()?;
        let res = self.sender.close().await;
        self.lifecycle.close_send();
        res.map_err(|status| self.lifecycle.fail(status))
    }

    pub async fn recv(&mut self) -> Result<Option<I::Item>> {
        self.settled()?;
        match self.receiver.recv().await {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => {
                self.lifecycle.close_recv();
                Ok(None)
            }
            Err(status) => Err(self.lifecycle.fail(status)),
        }
    }

    /// Runs arbitrary work under this call's supervision.
    pub async fn supervise<F, T>(&mut self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.settled()?;
        let res = self.sender.supervisor.supervise(fut).await;
        res.map_err(|status| self.lifecycle.fail(status))
    }

    pub async fn pause(&mut self, interval: Duration) -> Result<()> {
        self.settled()?;
        let res = self.sender.supervisor.pause(interval).await;
        res.map_err(|status| self.lifecycle.fail(status))
    }

    /// Settles the call as successful and returns the outcome on record.
    pub fn finish(&mut self) -> Result<()> {
        self.lifecycle.complete()
    }

    /// Settles the call as failed and returns the failure on record.
    pub fn fail(&mut self, status: Status) -> Status {
        self.lifecycle.fail(status)
    }
}
