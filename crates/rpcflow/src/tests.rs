use crate::*;
use core::{cell::Cell, fmt, marker::PhantomData, ops::ControlFlow, time::Duration};
use futures::stream;
use tokio::time::Instant;

#[derive(Debug)]
struct Negative(i64);

impl fmt::Display for Negative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Received a negative number: {}", self.0)
    }
}

impl Classify for Negative {
    fn code(&self) -> Code {
        Code::InvalidArgument
    }
}

fn prime_factors(mut n: i64) -> Vec<i64> {
    let mut factors = Vec::new();
    let mut divisor = 2;
    while n > 1 {
        if n % divisor == 0 {
            factors.push(divisor);
            n /= divisor;
        } else {
            divisor += 1;
        }
    }
    factors
}

/// Starts a callee that serves every test operation and returns the caller's
/// end of the connection.
fn spawn_server<C: Clock>(clock: C) -> Connection<i64, i64, C> {
    let (conn, mut listener) = connection::<i64, i64, _>(clock, 4);
    tokio::spawn(async move {
        while let Some(call) = listener.accept().await {
            tokio::spawn(route(call));
        }
    });
    conn
}

async fn route<C: Clock>(call: ServerCall<i64, i64, C>) -> Result<()> {
    let operation = call.meta().operation().to_owned();
    match operation.as_str() {
        "double" => {
            serve_unary(call, |n: i64| async move {
                if n < 0 {
                    return Err(Status::from_classified(Negative(n)));
                }
                Ok(n * 2)
            })
            .await
        }
        "stall" => serve_unary(call, |_n: i64| core::future::pending()).await,
        "factors" => {
            serve_server_streaming(call, |n: i64, out: Emitter<i64>| async move {
                for factor in prime_factors(n) {
                    out.emit(factor).await?;
                }
                Ok(())
            })
            .await
        }
        "slow-count" => {
            serve_server_streaming(call, |n: i64, out: Emitter<i64>| async move {
                for i in 0..n {
                    out.emit(i).await?;
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Ok(())
            })
            .await
        }
        "factors-then-reject" => {
            serve_server_streaming(call, |n: i64, out: Emitter<i64>| async move {
                for factor in prime_factors(n) {
                    out.emit(factor).await?;
                }
                Err(Status::invalid_argument("too many factors"))
            })
            .await
        }
        "sum" => {
            serve_client_streaming(call, |mut requests| async move {
                let mut total = 0;
                while let Some(n) = requests.next().await? {
                    total += n;
                }
                Ok(total)
            })
            .await
        }
        "max" => {
            serve_bidi(call, |mut requests, out| async move {
                let mut max: Option<i64> = None;
                while let Some(n) = requests.next().await? {
                    let current = max.map_or(n, |m| m.max(n));
                    max = Some(current);
                    out.emit(current).await?;
                }
                Ok(())
            })
            .await
        }
        "max-until-negative" => {
            serve_bidi(call, |mut requests, out| async move {
                let mut max: Option<i64> = None;
                while let Some(n) = requests.next().await? {
                    if n < 0 {
                        return Err(Status::from_classified(Negative(n)));
                    }
                    let current = max.map_or(n, |m| m.max(n));
                    max = Some(current);
                    out.emit(current).await?;
                }
                Ok(())
            })
            .await
        }
        "echo" => {
            serve_bidi(call, |mut requests, out| async move {
                while let Some(n) = requests.next().await? {
                    out.emit(n).await?;
                }
                Ok(())
            })
            .await
        }
        "drain-then-reply" => {
            serve_bidi(call, |mut requests, out| async move {
                let mut seen = Vec::new();
                while let Some(n) = requests.next().await? {
                    seen.push(n);
                }
                for n in seen {
                    out.emit(n * 2).await?;
                }
                Ok(())
            })
            .await
        }
        "reply-then-leave" => {
            serve_bidi(call, |requests, out| async move {
                drop(requests);
                for n in 1..=3 {
                    out.emit(n).await?;
                }
                Ok(())
            })
            .await
        }
        "reject-first" => {
            serve_bidi(call, |mut requests, _out| async move {
                let first = requests.next().await?;
                Err(Status::invalid_argument(format!("rejected {first:?}")))
            })
            .await
        }
        "silent" => {
            serve_bidi(call, |mut requests, _out| async move {
                while requests.next().await?.is_some() {}
                core::future::pending().await
            })
            .await
        }
        _ => {
            // Simulates a callee that disappears mid-call.
            drop(call);
            Err(Status::unavailable("vanished"))
        }
    }
}

#[tokio::test]
async fn unary_round_trip() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("double", &CallOptions::new()).await?;
    assert_eq!(call.unary(21).await?, 42);
    Ok(())
}

#[tokio::test]
async fn domain_failure_reaches_caller_verbatim() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("double", &CallOptions::new()).await?;
    let err = call.unary(-2).await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(err.message(), "Received a negative number: -2");
    assert!(!err.code().is_retryable());
    Ok(())
}

#[tokio::test]
async fn server_streaming_delivers_in_order_then_ends() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("factors", &CallOptions::new()).await?;
    let mut factors = Vec::new();
    let received = call
        .server_streaming(150, |f| {
            factors.push(f);
            ControlFlow::Continue(())
        })
        .await?;
    assert_eq!(factors, [2, 3, 5, 5]);
    assert_eq!(received, 4);
    Ok(())
}

#[tokio::test]
async fn server_streaming_consumer_can_stop_early() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("factors", &CallOptions::new()).await?;
    let mut first = None;
    let received = call
        .server_streaming(1024, |f| {
            first = Some(f);
            ControlFlow::Break(())
        })
        .await?;
    assert_eq!(received, 1);
    assert_eq!(first, Some(2));
    Ok(())
}

/// An outbound transport that can move between threads but not be shared.
#[derive(Debug)]
struct Unshared<T> {
    inner: ChannelSender<T>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Send> Outbound for Unshared<T> {
    type Item = T;

    async fn send(&mut self, item: T) -> Result<()> {
        self.inner.send(item).await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }

    async fn fail(&mut self, status: Status) -> Result<()> {
        self.inner.fail(status).await
    }
}

#[tokio::test]
async fn paced_bidi_runs_over_a_transport_that_is_not_sync() -> Result<()> {
    let (up_tx, mut up_rx) = channel::<i64>(2);
    let (mut down_tx, down_rx) = channel::<i64>(2);
    let peer = tokio::spawn(async move {
        while let Some(n) = up_rx.recv().await? {
            down_tx.send(n + 1).await?;
        }
        down_tx.close().await
    });

    let call = Call::new(
        CallMeta::new(CallId::new(0), "increment", None),
        Unshared {
            inner: up_tx,
            _not_sync: PhantomData,
        },
        down_rx,
        Supervisor::unbounded(TokioClock),
    );
    let mut received = Vec::new();
    let exchange = call
        .bidi(stream::iter([1, 2, 3]), Duration::from_millis(1), |n| {
            received.push(n)
        })
        .await?;
    assert_eq!(received, [2, 3, 4]);
    assert_eq!(
        exchange,
        Exchange {
            sent: 3,
            received: 3
        }
    );
    peer.await.unwrap()
}

#[tokio::test]
async fn emitted_responses_precede_handler_failure() -> Result<()> {
    let conn = spawn_server(TokioClock);
    for _ in 0..50 {
        let call = conn
            .open_call("factors-then-reject", &CallOptions::new())
            .await?;
        let mut factors = Vec::new();
        let err = call
            .server_streaming(150, |f| {
                factors.push(f);
                ControlFlow::Continue(())
            })
            .await
            .unwrap_err();
        assert_eq!(factors, [2, 3, 5, 5]);
        assert_eq!(err, Status::invalid_argument("too many factors"));
    }
    Ok(())
}

#[tokio::test]
async fn bidi_keeps_replies_sent_before_rejection() -> Result<()> {
    let conn = spawn_server(TokioClock);
    for _ in 0..50 {
        let call = conn
            .open_call("max-until-negative", &CallOptions::new())
            .await?;
        let mut maxima = Vec::new();
        let err = call
            .bidi(stream::iter([3, 9, 4, -1]), Duration::ZERO, |m| {
                maxima.push(m)
            })
            .await
            .unwrap_err();
        assert_eq!(maxima, [3, 9, 9]);
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), "Received a negative number: -1");
    }
    Ok(())
}

#[tokio::test]
async fn client_streaming_aggregates_after_close() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("sum", &CallOptions::new()).await?;
    assert_eq!(
        call.client_streaming(stream::iter([1, 2, 3, 4]), Duration::ZERO)
            .await?,
        10
    );

    let call = conn.open_call("sum", &CallOptions::new()).await?;
    assert_eq!(
        call.client_streaming(stream::iter(Vec::<i64>::new()), Duration::ZERO)
            .await?,
        0
    );
    Ok(())
}

#[tokio::test]
async fn bidi_running_maximum() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("max", &CallOptions::new()).await?;
    let mut maxima = Vec::new();
    let exchange = call
        .bidi(
            stream::iter([4, 7, 2, 19, 4, 6, 32]),
            Duration::ZERO,
            |m| maxima.push(m),
        )
        .await?;
    assert_eq!(maxima, [4, 7, 7, 19, 19, 19, 32]);
    assert_eq!(
        exchange,
        Exchange {
            sent: 7,
            received: 7
        }
    );
    Ok(())
}

#[tokio::test]
async fn messages_arrive_in_send_order() -> Result<()> {
    let conn = spawn_server(TokioClock);
    for n in [0_i64, 1, 7, 250] {
        let sent: Vec<i64> = (0..n).map(|i| (i * 31) % 17 - 8).collect();
        let mut received = Vec::new();
        let call = conn.open_call("echo", &CallOptions::new()).await?;
        let exchange = call
            .bidi(stream::iter(sent.clone()), Duration::ZERO, |m| {
                received.push(m)
            })
            .await?;
        assert_eq!(received, sent);
        assert_eq!(exchange.sent, sent.len());
        assert_eq!(exchange.received, sent.len());
    }
    Ok(())
}

#[tokio::test]
async fn recv_after_clean_end_stays_ended() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let mut call = conn.open_call("factors", &CallOptions::new()).await?;
    assert_eq!(call.state(), CallState::Open);

    call.send(12).await?;
    call.close_send().await?;
    assert_eq!(call.state(), CallState::HalfClosedSend);

    let mut factors = Vec::new();
    while let Some(f) = call.recv().await? {
        factors.push(f);
    }
    assert_eq!(factors, [2, 2, 3]);
    assert_eq!(call.recv().await?, None);
    assert_eq!(call.recv().await?, None);
    assert_eq!(call.state(), CallState::Closed);
    assert_eq!(call.finish(), Ok(()));
    Ok(())
}

#[tokio::test]
async fn settled_call_reports_one_status() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let mut call = conn.open_call("silent", &CallOptions::new()).await?;
    call.send(1).await?;
    call.cancel_handle().cancel();

    let first = call.recv().await.unwrap_err();
    assert_eq!(first.code(), Code::Cancelled);
    assert_eq!(call.state(), CallState::Closed);
    assert_eq!(call.send(2).await.unwrap_err(), first);
    assert_eq!(call.close_send().await.unwrap_err(), first);
    assert_eq!(call.recv().await.unwrap_err(), first);
    assert_eq!(call.finish().unwrap_err(), first);
    assert_eq!(call.fail(Status::internal("later")), first);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deadline_fails_a_stalled_unary_call() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let start = Instant::now();
    let options = CallOptions::new().with_timeout(Duration::from_secs(2));
    let call = conn.open_call("stall", &options).await?;

    let err = call.unary(1).await.unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert_eq!(err.message(), "deadline exceeded");

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_millis(2100));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deadline_keeps_partial_stream_results() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let options = CallOptions::new().with_timeout(Duration::from_millis(2500));
    let call = conn.open_call("slow-count", &options).await?;

    let mut seen = Vec::new();
    let err = call
        .server_streaming(10, |n| {
            seen.push(n);
            ControlFlow::Continue(())
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert_eq!(seen, [0, 1, 2]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_paced_client_stream() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let start = Instant::now();
    let options = CallOptions::new().with_timeout(Duration::from_millis(3500));
    let call = conn.open_call("sum", &options).await?;

    let err = call
        .client_streaming(stream::iter(1..=10), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(start.elapsed() < Duration::from_secs(4));
    Ok(())
}

#[tokio::test]
async fn manual_clock_expires_calls() -> Result<()> {
    let clock = ManualClock::new();
    let conn = spawn_server(clock.clone());
    let options = CallOptions::new().with_timeout(Duration::from_secs(30));
    let call = conn.open_call("stall", &options).await?;
    let pending = tokio::spawn(call.unary(1));

    tokio::task::yield_now().await;
    clock.advance(Duration::from_secs(29));
    tokio::task::yield_now().await;
    assert!(!pending.is_finished());

    clock.advance(Duration::from_secs(1));
    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
    Ok(())
}

#[tokio::test]
async fn send_finishing_first_does_not_deadlock() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("drain-then-reply", &CallOptions::new()).await?;
    let mut replies = Vec::new();
    let exchange = call
        .bidi(stream::iter(1..=5), Duration::ZERO, |m| replies.push(m))
        .await?;
    assert_eq!(replies, [2, 4, 6, 8, 10]);
    assert_eq!(
        exchange,
        Exchange {
            sent: 5,
            received: 5
        }
    );
    Ok(())
}

#[tokio::test]
async fn receive_finishing_first_does_not_deadlock() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("reply-then-leave", &CallOptions::new()).await?;
    let mut replies = Vec::new();
    let exchange = call
        .bidi(stream::iter(0..1_000), Duration::ZERO, |m| replies.push(m))
        .await?;
    assert_eq!(replies, [1, 2, 3]);
    assert_eq!(exchange.received, 3);
    assert!(exchange.sent <= 1_000);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn peer_failure_unblocks_paced_sender() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let start = Instant::now();
    let call = conn.open_call("reject-first", &CallOptions::new()).await?;

    let err = call
        .bidi(stream::iter([1, 2, 3]), Duration::from_secs(3600), |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(err.message(), "rejected Some(1)");
    assert!(start.elapsed() < Duration::from_secs(3600));
    Ok(())
}

#[tokio::test]
async fn vanished_peer_is_unavailable() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("vanish", &CallOptions::new()).await?;
    let err = call.unary(1).await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert!(err.code().is_retryable());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn explicit_cancel_unblocks_both_loops() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let call = conn.open_call("silent", &CallOptions::new()).await?;
    let handle = call.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        // A second cancel is a no-op.
        handle.cancel();
    });

    let err = call
        .bidi(stream::pending::<i64>(), Duration::ZERO, |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Cancelled);
    Ok(())
}

#[tokio::test]
async fn cancelling_one_call_leaves_others_alone() -> Result<()> {
    let conn = spawn_server(TokioClock);
    let stalled = conn.open_call("stall", &CallOptions::new()).await?;
    let cancel = stalled.cancel_handle();
    let stalled = tokio::spawn(stalled.unary(1));

    let other = conn.open_call("double", &CallOptions::new()).await?;
    cancel.cancel();

    let err = stalled.await.unwrap().unwrap_err();
    assert_eq!(err.code(), Code::Cancelled);
    assert_eq!(other.unary(5).await?, 10);
    Ok(())
}

#[tokio::test]
async fn closed_listener_is_unavailable() {
    let (conn, listener) = connection::<i64, i64, _>(TokioClock, 1);
    drop(listener);
    let err = conn
        .open_call("double", &CallOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
}

#[tokio::test]
async fn serves_a_predecoded_request() -> Result<()> {
    let (tx, mut rx) = channel::<i64>(1);
    let call = Call::new(
        CallMeta::new(CallId::new(7), "double", None),
        tx,
        Single::new(4),
        Supervisor::unbounded(TokioClock),
    );
    serve_unary(call, |n: i64| async move { Ok(n + 1) }).await?;
    assert_eq!(rx.recv().await?, Some(5));
    assert_eq!(rx.recv().await?, None);
    Ok(())
}
