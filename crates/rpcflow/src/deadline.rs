//! Deadlines, clocks and the per-call supervisor.
//!
//! Every suspending operation on a call goes through [`Supervisor::supervise`],
//! which races it against the call's cancellation token and its deadline. The
//! clock is injectable so deadline behavior can be tested without waiting on
//! wall-clock time.

use crate::{Result, Status};
use core::{fmt, future::Future, time::Duration};
use std::sync::Arc;
use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;

/// The message attached to every deadline expiry.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// A source of "now" and a way to wait until a later instant.
///
/// We require `Send` on the sleep future so supervised operations can move
/// between worker threads.
pub trait Clock: Clone + fmt::Debug + Send + Sync + 'static {
    fn now(&self) -> Instant;

    fn sleep_until(&self, deadline: Instant) -> impl Future<Output = ()> + Send;
}

/// A [`Clock`] backed by Tokio's timer.
///
/// Honours Tokio's paused test time, so `#[tokio::test(start_paused = true)]`
/// drives deadlines deterministically.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> impl Future<Output = ()> + Send {
        tokio::time::sleep_until(deadline)
    }
}

/// A [`Clock`] that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to a call and keep
/// another to [`advance`](ManualClock::advance) it.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<watch::Sender<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        let (now, _) = watch::channel(start);
        Self { now: Arc::new(now) }
    }

    /// Moves time forward, waking every sleeper whose instant has been
    /// reached.
    pub fn advance(&self, by: Duration) {
        self.now.send_modify(|now| *now += by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.borrow()
    }

    fn sleep_until(&self, deadline: Instant) -> impl Future<Output = ()> + Send {
        let mut now = self.now.subscribe();
        async move {
            loop {
                let reached = *now.borrow_and_update() >= deadline;
                if reached {
                    return;
                }
                if now.changed().await.is_err() {
                    // Time can no longer advance.
                    return core::future::pending().await;
                }
            }
        }
    }
}

/// An absolute expiry for a call, fixed when the call is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);

impl Deadline {
    /// Roughly 30 years, the same horizon Tokio uses for "never".
    const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

    /// Computes the deadline `timeout` from the clock's current time.
    pub fn after<C: Clock>(clock: &C, timeout: Duration) -> Self {
        let now = clock.now();
        Self(
            now.checked_add(timeout)
                .unwrap_or_else(|| now + Self::FAR_FUTURE),
        )
    }

    pub const fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub const fn instant(self) -> Instant {
        self.0
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining<C: Clock>(self, clock: &C) -> Duration {
        self.0.saturating_duration_since(clock.now())
    }

    pub fn is_expired<C: Clock>(self, clock: &C) -> bool {
        clock.now() >= self.0
    }
}

/// Cancels one call from outside the tasks driving it.
///
/// Cancelling is idempotent, and cancelling a call that already reached its
/// terminal state has no effect on its outcome.
#[derive(Clone, Debug)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Races call operations against cancellation and the call's deadline.
///
/// Clones share the same token, so both directions of a call observe the same
/// cancellation.
#[derive(Clone, Debug)]
pub struct Supervisor<C = TokioClock> {
    deadline: Option<Deadline>,
    cancel: CancellationToken,
    clock: C,
}

impl<C: Clock> Supervisor<C> {
    pub const fn new(deadline: Option<Deadline>, cancel: CancellationToken, clock: C) -> Self {
        Self {
            deadline,
            cancel,
            clock,
        }
    }

    /// A supervisor with no deadline and a fresh token.
    pub fn unbounded(clock: C) -> Self {
        Self::new(None, CancellationToken::new(), clock)
    }

    pub const fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails fast if the call is already cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Status::cancelled("call cancelled"));
        }
        match self.deadline {
            Some(deadline) if deadline.is_expired(&self.clock) => {
                Err(Status::deadline_exceeded(DEADLINE_EXCEEDED))
            }
            _ => Ok(()),
        }
    }

    /// Runs `fut` unless the call is cancelled or its deadline passes first.
    ///
    /// Cancellation takes precedence over expiry, and both take precedence over
    /// a result that becomes ready in the same poll.
    pub async fn supervise<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let expiry = async {
            match self.deadline {
                Some(deadline) => self.clock.sleep_until(deadline.instant()).await,
                None => core::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Status::cancelled("call cancelled")),
            () = expiry => Err(Status::deadline_exceeded(DEADLINE_EXCEEDED)),
            res = fut => res,
        }
    }

    /// Suspends for a pacing interval under supervision. A zero interval only
    /// checks for cancellation and expiry.
    pub async fn pause(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return self.check();
        }
        let until = self.clock.now() + interval;
        self.supervise(async {
            self.clock.sleep_until(until).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Code;

    #[tokio::test(start_paused = true)]
    async fn completes_before_deadline_untouched() {
        let clock = TokioClock;
        let supervisor = Supervisor::new(
            Some(Deadline::after(&clock, Duration::from_secs(5))),
            CancellationToken::new(),
            clock,
        );

        let value = supervisor
            .supervise(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(7)
            })
            .await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_interrupts_pending_work() {
        let clock = TokioClock;
        let start = Instant::now();
        let supervisor = Supervisor::new(
            Some(Deadline::after(&clock, Duration::from_millis(250))),
            CancellationToken::new(),
            clock,
        );

        let err = supervisor
            .supervise(core::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert_eq!(err.message(), DEADLINE_EXCEEDED);
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(start.elapsed() < Duration::from_millis(260));
    }

    #[tokio::test]
    async fn cancellation_is_idempotent_and_wins() {
        let supervisor = Supervisor::unbounded(TokioClock);
        let handle = supervisor.cancel_handle();
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        let err = supervisor.supervise(async { Ok(()) }).await.unwrap_err();
        assert_eq!(err.code(), Code::Cancelled);
        assert_eq!(supervisor.check().unwrap_err().code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn zero_pause_only_checks() {
        let supervisor = Supervisor::unbounded(TokioClock);
        assert_eq!(supervisor.pause(Duration::ZERO).await, Ok(()));
    }

    #[tokio::test]
    async fn manual_clock_drives_expiry() {
        let clock = ManualClock::new();
        let deadline = Deadline::after(&clock, Duration::from_secs(10));
        let supervisor = Supervisor::new(Some(deadline), CancellationToken::new(), clock.clone());

        let waiter = tokio::spawn(async move {
            supervisor
                .supervise(core::future::pending::<Result<()>>())
                .await
        });

        clock.advance(Duration::from_secs(4));
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        assert_eq!(deadline.remaining(&clock), Duration::from_secs(6));

        clock.advance(Duration::from_secs(6));
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert!(deadline.is_expired(&clock));
    }

    #[tokio::test]
    async fn manual_clock_pause_waits_for_advance() {
        let clock = ManualClock::new();
        let supervisor = Supervisor::unbounded(clock.clone());
        let pause = tokio::spawn(async move { supervisor.pause(Duration::from_secs(1)).await });

        tokio::task::yield_now().await;
        assert!(!pause.is_finished());

        clock.advance(Duration::from_secs(1));
        assert_eq!(pause.await.unwrap(), Ok(()));
    }
}
