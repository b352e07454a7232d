//! Typed clients for the calculator and greet services.
//!
//! Each method opens a call on the shared [`GrpcConnection`] and runs it with
//! the rpcflow driver for the method's interaction shape, so deadlines,
//! cancellation and the single terminal status behave the same as for any
//! other rpcflow call. Streaming producers are paced by
//! [`CallOptions::pacing`].

use crate::{
    proto::{
        calculator::{
            ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest,
            FindMaximumResponse, PrimeNumberDecompositionRequest,
            PrimeNumberDecompositionResponse, SquareRootRequest, SquareRootResponse, SumRequest,
            SumResponse, paths as calc_paths,
        },
        greet::{
            GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest,
            GreetManyTimesResponse, GreetRequest, GreetResponse, GreetWithDeadlineRequest,
            GreetWithDeadlineResponse, Greeting, LongGreetRequest, LongGreetResponse,
            paths as greet_paths,
        },
    },
    transport::{GrpcCall, GrpcConnection},
};
use core::ops::ControlFlow;
use futures::{Stream, StreamExt};
use rpcflow::{CallOptions, Exchange, Result};

#[derive(Clone, Debug)]
pub struct CalculatorClient {
    conn: GrpcConnection,
}

impl CalculatorClient {
    pub const fn new(conn: GrpcConnection) -> Self {
        Self { conn }
    }

    pub async fn sum(
        &self,
        first_number: i64,
        second_number: i64,
        options: &CallOptions,
    ) -> Result<i64> {
        let call: GrpcCall<SumRequest, SumResponse> = self.conn.open_call(calc_paths::SUM, options);
        let response = call
            .unary(SumRequest {
                first_number,
                second_number,
            })
            .await?;
        Ok(response.result)
    }

    /// Streams the prime factors of `number` into `on_factor` and returns how
    /// many were received.
    pub async fn prime_number_decomposition<F>(
        &self,
        number: i64,
        options: &CallOptions,
        mut on_factor: F,
    ) -> Result<usize>
    where
        F: FnMut(i64) -> ControlFlow<()>,
    {
        let call: GrpcCall<PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse> =
            self.conn.open_call(calc_paths::PRIME_NUMBER_DECOMPOSITION, options);
        call.server_streaming(
            PrimeNumberDecompositionRequest { number },
            |response: PrimeNumberDecompositionResponse| on_factor(response.prime_factor),
        )
        .await
    }

    pub async fn compute_average<S>(&self, numbers: S, options: &CallOptions) -> Result<f64>
    where
        S: Stream<Item = i64>,
    {
        let call: GrpcCall<ComputeAverageRequest, ComputeAverageResponse> =
            self.conn.open_call(calc_paths::COMPUTE_AVERAGE, options);
        let requests = numbers.map(|number| ComputeAverageRequest { number });
        let response = call.client_streaming(requests, options.pacing()).await?;
        Ok(response.average)
    }

    /// Sends `numbers` while feeding every running maximum the server answers
    /// with into `on_maximum`.
    pub async fn find_maximum<S, F>(
        &self,
        numbers: S,
        options: &CallOptions,
        mut on_maximum: F,
    ) -> Result<Exchange>
    where
        S: Stream<Item = i32> + Send + 'static,
        F: FnMut(i32),
    {
        let call: GrpcCall<FindMaximumRequest, FindMaximumResponse> =
            self.conn.open_call(calc_paths::FIND_MAXIMUM, options);
        let requests = numbers.map(|number| FindMaximumRequest { number });
        call.bidi(
            requests,
            options.pacing(),
            |response: FindMaximumResponse| on_maximum(response.maximum),
        )
        .await
    }

    pub async fn square_root(&self, number: i32, options: &CallOptions) -> Result<f64> {
        let call: GrpcCall<SquareRootRequest, SquareRootResponse> =
            self.conn.open_call(calc_paths::SQUARE_ROOT, options);
        let response = call.unary(SquareRootRequest { number }).await?;
        Ok(response.number_root)
    }
}

#[derive(Clone, Debug)]
pub struct GreetClient {
    conn: GrpcConnection,
}

impl GreetClient {
    pub const fn new(conn: GrpcConnection) -> Self {
        Self { conn }
    }

    pub async fn greet(&self, greeting: Greeting, options: &CallOptions) -> Result<String> {
        let call: GrpcCall<GreetRequest, GreetResponse> =
            self.conn.open_call(greet_paths::GREET, options);
        let response = call.unary(GreetRequest::from(greeting)).await?;
        Ok(response.result)
    }

    pub async fn greet_many_times<F>(
        &self,
        greeting: Greeting,
        options: &CallOptions,
        mut on_greeting: F,
    ) -> Result<usize>
    where
        F: FnMut(String) -> ControlFlow<()>,
    {
        let call: GrpcCall<GreetManyTimesRequest, GreetManyTimesResponse> =
            self.conn.open_call(greet_paths::GREET_MANY_TIMES, options);
        call.server_streaming(
            GreetManyTimesRequest::from(greeting),
            |response: GreetManyTimesResponse| on_greeting(response.result),
        )
        .await
    }

    pub async fn long_greet<S>(&self, greetings: S, options: &CallOptions) -> Result<String>
    where
        S: Stream<Item = Greeting>,
    {
        let call: GrpcCall<LongGreetRequest, LongGreetResponse> =
            self.conn.open_call(greet_paths::LONG_GREET, options);
        let response = call
            .client_streaming(greetings.map(LongGreetRequest::from), options.pacing())
            .await?;
        Ok(response.result)
    }

    pub async fn greet_everyone<S, F>(
        &self,
        greetings: S,
        options: &CallOptions,
        mut on_greeting: F,
    ) -> Result<Exchange>
    where
        S: Stream<Item = Greeting> + Send + 'static,
        F: FnMut(String),
    {
        let call: GrpcCall<GreetEveryoneRequest, GreetEveryoneResponse> =
            self.conn.open_call(greet_paths::GREET_EVERYONE, options);
        call.bidi(
            greetings.map(GreetEveryoneRequest::from),
            options.pacing(),
            |response: GreetEveryoneResponse| on_greeting(response.result),
        )
        .await
    }

    /// A slow unary greeting. Set a timeout on `options` to bound it; an
    /// exhausted deadline fails with `DeadlineExceeded`.
    pub async fn greet_with_deadline(
        &self,
        greeting: Greeting,
        options: &CallOptions,
    ) -> Result<String> {
        let call: GrpcCall<GreetWithDeadlineRequest, GreetWithDeadlineResponse> =
            self.conn.open_call(greet_paths::GREET_WITH_DEADLINE, options);
        let response = call.unary(GreetWithDeadlineRequest::from(greeting)).await?;
        Ok(response.result)
    }
}
