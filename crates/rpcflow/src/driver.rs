//! Caller-side drivers for the unary, server-streaming and client-streaming
//! shapes. The bidirectional driver lives with the coordinator.
//!
//! Each driver consumes the [`Call`], so the single outcome it returns is the
//! only terminal status the caller can ever observe for that call.

use crate::{Call, Clock, Inbound, Outbound, Result, Status};
use core::{ops::ControlFlow, pin::pin, time::Duration};
use futures::{FutureExt, Stream, StreamExt};

impl<O, I, C> Call<O, I, C>
where
    O: Outbound,
    I: Inbound,
    C: Clock,
{
    /// Sends one request and waits for exactly one response.
    pub async fn unary(mut self, request: O::Item) -> Result<I::Item> {
        let outcome = async {
            self.offer(request).await?;
            self.close_send().await?;
            self.single_response().await
        }
        .await;
        self.conclude(outcome)
    }

    /// Sends one request and hands each response to `consumer` in arrival
    /// order until the peer ends the stream.
    ///
    /// The consumer may stop early by returning [`ControlFlow::Break`]; the
    /// call is then cancelled and reported as successful with the number of
    /// responses consumed so far.
    pub async fn server_streaming<F>(mut self, request: O::Item, mut consumer: F) -> Result<usize>
    where
        F: FnMut(I::Item) -> ControlFlow<()>,
    {
        let outcome = async {
            self.offer(request).await?;
            self.close_send().await?;
            let mut received = 0;
            while let Some(response) = self.recv().await? {
                received += 1;
                if consumer(response).is_break() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        call = %self.meta.id(),
                        received,
                        "consumer stopped the stream"
                    );
                    self.cancel_handle().cancel();
                    break;
                }
            }
            Ok(received)
        }
        .await;
        self.conclude(outcome)
    }

    /// Sends every request `requests` produces, pausing `pacing` after each,
    /// then closes the send direction and waits for the one aggregate
    /// response.
    ///
    /// If the peer stops receiving early, the remaining requests are dropped
    /// and the peer's response or status decides the outcome.
    pub async fn client_streaming<S>(mut self, requests: S, pacing: Duration) -> Result<I::Item>
    where
        S: Stream<Item = O::Item>,
    {
        let outcome = async {
            let mut requests = pin!(requests);
            while let Some(request) = self.supervise(requests.next().map(Ok)).await? {
                if !self.offer(request).await? {
                    break;
                }
                self.pause(pacing).await?;
            }
            self.close_send().await?;
            self.single_response().await
        }
        .await;
        self.conclude(outcome)
    }

    async fn single_response(&mut self) -> Result<I::Item> {
        let response = self
            .recv()
            .await?
            .ok_or_else(|| Status::internal("stream ended without a response"))?;
        if self.recv().await?.is_some() {
            return Err(Status::internal("received more than one response"));
        }
        Ok(response)
    }

    fn conclude<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => self.finish().map(|()| value),
            Err(status) => Err(self.fail(status)),
        }
    }
}
