//! Admission, accounting and shutdown of in-flight calls.
//!
//! Every gRPC method asks the [`CallTracker`] for a [`CallContext`] before
//! doing any work. The context carries the call's identity, the deadline the
//! client sent in `grpc-timeout`, and a cancellation token that is a child of
//! the server's shutdown token, so stopping the server reaches every call
//! that is still running.

use crate::server::telemetry::{
    decrement_calls_inflight, increment_call_errors, increment_calls, increment_calls_inflight,
    record_call_duration,
};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use rpcflow::{
    Call, CallId, CallMeta, Code, Deadline, Inbound, Outbound, Supervisor, TokioClock,
};
use rpcflow_tonic_core::{Error, transport::grpc_timeout};
use std::{sync::Arc, time::Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;

/// Tracks the calls a server is serving and coordinates their shutdown.
#[derive(Debug)]
pub struct CallTracker {
    next_id: AtomicU64,
    inflight: AtomicUsize,
    accepting: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl CallTracker {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            inflight: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Admits a new call to `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn begin(
        self: &Arc<Self>,
        operation: &'static str,
        metadata: &MetadataMap,
    ) -> Result<CallContext, Error> {
        if !self.is_accepting() {
            increment_call_errors(Code::Unavailable);
            return Err(Error::ServiceShutdown);
        }

        self.inflight.fetch_add(1, Ordering::AcqRel);
        increment_calls(operation);
        increment_calls_inflight();

        let id = CallId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let deadline = grpc_timeout(metadata).map(|t| Deadline::after(&TokioClock, t));

        #[cfg(feature = "tracing")]
        tracing::debug!(call = %id, operation, timeout = ?grpc_timeout(metadata), "call accepted");

        Ok(CallContext {
            meta: CallMeta::new(id, operation, deadline),
            cancel: self.shutdown_token.child_token(),
            guard: InflightGuard {
                tracker: Arc::clone(self),
                operation,
                started: Instant::now(),
            },
        })
    }

    /// Gracefully stops all calls.
    ///
    /// - Refuses new calls.
    /// - Waits up to the shutdown timeout for in-flight calls to finish on
    ///   their own.
    /// - Cancels whatever is left, which ends those calls with `Cancelled`.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new calls ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new calls");
        self.accepting.store(false, Ordering::Release);

        // === Phase 1: Wait for in-flight calls to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight calls ({} active)", self.inflight());
        let drained = timeout(self.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight calls drained");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} calls still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining calls ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining calls via shutdown token");
        self.shutdown_token.cancel();
    }
}

/// What a method needs to build its [`Call`].
#[derive(Debug)]
pub struct CallContext {
    meta: CallMeta,
    cancel: CancellationToken,
    guard: InflightGuard,
}

impl CallContext {
    pub const fn meta(&self) -> &CallMeta {
        &self.meta
    }

    /// Wraps the method's message channels into a supervised call. The guard
    /// must live until the call has settled.
    pub fn into_call<O, I>(self, outbound: O, inbound: I) -> (Call<O, I>, InflightGuard)
    where
        O: Outbound,
        I: Inbound,
    {
        let supervisor = Supervisor::new(self.meta.deadline(), self.cancel, TokioClock);
        (Call::new(self.meta, outbound, inbound, supervisor), self.guard)
    }
}

/// Holds one slot of the in-flight count. Dropping it releases the slot,
/// including when tonic drops a handler whose client went away.
#[derive(Debug)]
pub struct InflightGuard {
    tracker: Arc<CallTracker>,
    operation: &'static str,
    started: Instant,
}

impl InflightGuard {
    /// Records the call's terminal status and duration.
    pub fn finish(self, outcome: &rpcflow::Result<()>) {
        if let Err(status) = outcome {
            increment_call_errors(status.code());
            #[cfg(feature = "tracing")]
            tracing::debug!(
                operation = self.operation,
                code = %status.code(),
                reason = status.message(),
                "call failed"
            );
        }
        record_call_duration(self.operation, self.started.elapsed().as_secs_f64() * 1000.0);
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.tracker.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_calls_inflight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcflow::{Single, channel};

    const OPERATION: &str = "/test.Service/Method";

    fn tracker(shutdown_timeout: Duration) -> Arc<CallTracker> {
        Arc::new(CallTracker::new(shutdown_timeout))
    }

    #[tokio::test]
    async fn guards_count_inflight_calls() {
        let tracker = tracker(Duration::from_secs(1));
        let first = tracker.begin(OPERATION, &MetadataMap::new()).unwrap();
        let second = tracker.begin(OPERATION, &MetadataMap::new()).unwrap();
        assert_eq!(tracker.inflight(), 2);
        assert_ne!(first.meta().id(), second.meta().id());

        drop(first);
        assert_eq!(tracker.inflight(), 1);
        let (_call, guard) = second.into_call(channel::<u8>(1).0, Single::new(0u8));
        guard.finish(&Ok(()));
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test]
    async fn grpc_timeout_becomes_the_call_deadline() {
        let tracker = tracker(Duration::from_secs(1));
        let mut metadata = MetadataMap::new();
        metadata.insert("grpc-timeout", "250m".parse().unwrap());

        let bounded = tracker.begin(OPERATION, &metadata).unwrap();
        let deadline = bounded.meta().deadline().unwrap();
        assert!(deadline.remaining(&TokioClock) <= Duration::from_millis(250));

        let unbounded = tracker.begin(OPERATION, &MetadataMap::new()).unwrap();
        assert!(unbounded.meta().deadline().is_none());
    }

    #[tokio::test]
    async fn refuses_calls_once_shutdown_begins() {
        let tracker = tracker(Duration::ZERO);
        tracker.shutdown().await;
        assert!(!tracker.is_accepting());

        let err = tracker.begin(OPERATION, &MetadataMap::new()).unwrap_err();
        assert!(matches!(err, Error::ServiceShutdown));
        assert_eq!(rpcflow::Status::from(err).code(), Code::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_calls_to_drain() {
        let tracker = tracker(Duration::from_secs(3));
        let context = tracker.begin(OPERATION, &MetadataMap::new()).unwrap();

        let release = tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            drop(context);
        });

        let started = tokio::time::Instant::now();
        tracker.shutdown().await;
        release.await.unwrap();

        assert_eq!(tracker.inflight(), 0);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_calls_that_outlive_the_timeout() {
        let tracker = tracker(Duration::from_secs(1));
        let context = tracker.begin(OPERATION, &MetadataMap::new()).unwrap();
        let (mut call, guard) = context.into_call(channel::<u8>(1).0, Single::new(0u8));

        let stuck = tokio::spawn(async move {
            let outcome = call
                .supervise(core::future::pending::<rpcflow::Result<()>>())
                .await;
            drop(guard);
            outcome
        });

        tracker.shutdown().await;
        let status = stuck.await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::Cancelled);
    }
}
