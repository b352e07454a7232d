//! Concurrent send and receive progression for bidirectional calls.
//!
//! The send loop runs on its own task and the receive loop runs on the
//! caller's task. They share no state: each owns one direction of the call,
//! and the only thing passed between them is an abort token that either loop
//! cancels when it fails, so the other one stops waiting instead of hanging
//! on a peer that will never answer. Joint completion is a join on the send
//! task's handle; the terminal outcome is decided only once both loops have
//! reported.

use crate::{Call, Clock, Code, Inbound, Outbound, RecvHalf, Result, SendHalf, Status};
use core::{pin::pin, time::Duration};
use futures::{FutureExt, Stream, StreamExt};
use tokio_util::{sync::CancellationToken, task::AbortOnDropHandle};

/// How one direction of a bidirectional call ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Termination {
    /// The direction finished normally.
    Clean,
    /// The direction was stopped because the other direction failed.
    Aborted,
    /// The direction failed on its own.
    Failed(Status),
}

/// What a bidirectional call exchanged before it closed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Exchange {
    pub sent: usize,
    pub received: usize,
}

/// Drives the outbound direction: sends every produced message, pausing
/// `pacing` after each, and closes the direction when `producer` is
/// exhausted.
///
/// A peer that stops receiving ends the loop cleanly, since the peer's
/// status on the inbound direction is what decides the call.
pub(crate) async fn run_send<O, C, S>(
    mut half: SendHalf<O, C>,
    producer: S,
    pacing: Duration,
    abort: CancellationToken,
) -> (Termination, usize)
where
    O: Outbound,
    C: Clock,
    S: Stream<Item = O::Item>,
{
    let work = async {
        let mut producer = pin!(producer);
        while let Some(item) = half.supervisor().supervise(producer.next().map(Ok)).await? {
            match half.send(item).await {
                Ok(()) => {}
                Err(status) if status.code() == Code::Unavailable && !half.is_open() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("peer stopped receiving, ending send loop");
                    return Ok(());
                }
                Err(status) => return Err(status),
            }
            half.pause(pacing).await?;
        }
        half.close().await
    };

    let termination = tokio::select! {
        biased;
        () = abort.cancelled() => Termination::Aborted,
        res = work => match res {
            Ok(()) => Termination::Clean,
            Err(status) => {
                abort.cancel();
                Termination::Failed(status)
            }
        },
    };
    (termination, half.sent())
}

/// Drives the inbound direction: hands each message to `consumer` in arrival
/// order until the peer's clean end-of-stream.
pub(crate) async fn run_recv<I, C, F>(
    half: &mut RecvHalf<I, C>,
    consumer: &mut F,
    abort: &CancellationToken,
) -> Termination
where
    I: Inbound,
    C: Clock,
    F: FnMut(I::Item),
{
    let work = async {
        while let Some(item) = half.recv().await? {
            consumer(item);
        }
        Ok::<_, Status>(())
    };

    tokio::select! {
        biased;
        () = abort.cancelled() => Termination::Aborted,
        res = work => match res {
            Ok(()) => Termination::Clean,
            Err(status) => {
                abort.cancel();
                Termination::Failed(status)
            }
        },
    }
}

/// Picks the single terminal outcome from the two directions' reports.
///
/// A failure seen on the inbound direction is the peer's own account of what
/// went wrong, so it takes precedence over a local send failure.
fn terminal(send: Termination, recv: Termination) -> Result<()> {
    match (send, recv) {
        (_, Termination::Failed(status)) | (Termination::Failed(status), _) => Err(status),
        (Termination::Clean, Termination::Clean) => Ok(()),
        _ => Err(Status::internal("stream aborted without a recorded failure")),
    }
}

impl<O, I, C> Call<O, I, C>
where
    O: Outbound + 'static,
    I: Inbound,
    C: Clock,
{
    /// Runs a bidirectional exchange.
    ///
    /// `producer` is sent on a separate task, pausing `pacing` after each
    /// message; `consumer` sees every inbound message in arrival order on the
    /// calling task. Returns once both directions are done, never earlier,
    /// and never blocks forever on one direction after the other has failed.
    pub async fn bidi<S, F>(
        self,
        producer: S,
        pacing: Duration,
        mut consumer: F,
    ) -> Result<Exchange>
    where
        S: Stream<Item = O::Item> + Send + 'static,
        F: FnMut(I::Item),
    {
        let Call {
            meta: _meta,
            mut lifecycle,
            sender,
            mut receiver,
        } = self;
        let abort = CancellationToken::new();

        let send_task = AbortOnDropHandle::new(tokio::spawn(run_send(
            sender,
            producer,
            pacing,
            abort.clone(),
        )));
        let recv = run_recv(&mut receiver, &mut consumer, &abort).await;
        let (send, sent) = match send_task.await {
            Ok(report) => report,
            Err(_e) => (
                Termination::Failed(Status::internal("send loop terminated unexpectedly")),
                0,
            ),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            call = %_meta.id(),
            operation = _meta.operation(),
            ?send,
            ?recv,
            sent,
            received = receiver.received(),
            "bidirectional exchange finished"
        );

        if send == Termination::Clean {
            lifecycle.close_send();
        }
        if recv == Termination::Clean {
            lifecycle.close_recv();
        }

        match terminal(send, recv) {
            Ok(()) => lifecycle.complete().map(|()| Exchange {
                sent,
                received: receiver.received(),
            }),
            Err(status) => Err(lifecycle.fail(status)),
        }
    }
}
