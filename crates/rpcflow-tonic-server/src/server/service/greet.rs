use super::pace;
use crate::server::{
    config::ServerConfig,
    domain::greet::{LongGreeting, first_name_only, full_name, hello, numbered},
    streaming::dispatch::{self, ResponseStream},
    tracker::CallTracker,
};
use rpcflow::Emitter;
use rpcflow_tonic_core::proto::greet::{
    GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest, GreetManyTimesResponse,
    GreetRequest, GreetResponse, GreetWithDeadlineRequest, GreetWithDeadlineResponse,
    LongGreetRequest, LongGreetResponse, greet_service_server::GreetService, paths,
};
use std::sync::Arc;
use tonic::{Request, Response, Streaming};

/// How many pauses a slow greeting takes before it answers.
const DEADLINE_STEPS: u32 = 3;

/// `greet.GreetService`.
#[derive(Clone)]
pub struct Greeter {
    config: ServerConfig,
    tracker: Arc<CallTracker>,
}

impl Greeter {
    pub const fn new(config: ServerConfig, tracker: Arc<CallTracker>) -> Self {
        Self { config, tracker }
    }
}

#[tonic::async_trait]
impl GreetService for Greeter {
    type GreetManyTimesStream = ResponseStream<GreetManyTimesResponse>;
    type GreetEveryoneStream = ResponseStream<GreetEveryoneResponse>;

    async fn greet(
        &self,
        request: Request<GreetRequest>,
    ) -> Result<Response<GreetResponse>, tonic::Status> {
        dispatch::unary(
            &self.tracker,
            paths::GREET,
            request,
            |req: GreetRequest| async move {
                let greeting = req.greeting.unwrap_or_default();
                Ok(GreetResponse::from(full_name(&greeting)))
            },
        )
        .await
    }

    async fn greet_many_times(
        &self,
        request: Request<GreetManyTimesRequest>,
    ) -> Result<Response<Self::GreetManyTimesStream>, tonic::Status> {
        let repeat = self.config.greet_repeat;
        let delay = self.config.greet_delay;
        dispatch::server_streaming(
            &self.tracker,
            paths::GREET_MANY_TIMES,
            self.config.stream_buffer_size,
            request,
            move |req: GreetManyTimesRequest, out: Emitter<GreetManyTimesResponse>| async move {
                let greeting = req.greeting.unwrap_or_default();
                for index in 0..repeat {
                    out.emit(numbered(index, &greeting).into()).await?;
                    pace(delay).await;
                }
                Ok(())
            },
        )
    }

    async fn long_greet(
        &self,
        request: Request<Streaming<LongGreetRequest>>,
    ) -> Result<Response<LongGreetResponse>, tonic::Status> {
        dispatch::client_streaming(
            &self.tracker,
            paths::LONG_GREET,
            request,
            |mut requests: dispatch::Requests<LongGreetRequest>| async move {
                let mut long = LongGreeting::default();
                while let Some(req) = requests.next().await? {
                    long.push(&req.greeting.unwrap_or_default());
                }
                Ok(LongGreetResponse::from(long.finish()))
            },
        )
        .await
    }

    async fn greet_everyone(
        &self,
        request: Request<Streaming<GreetEveryoneRequest>>,
    ) -> Result<Response<Self::GreetEveryoneStream>, tonic::Status> {
        dispatch::bidi(
            &self.tracker,
            paths::GREET_EVERYONE,
            self.config.stream_buffer_size,
            request,
            |mut requests: dispatch::Requests<GreetEveryoneRequest>,
             out: Emitter<GreetEveryoneResponse>| async move {
                while let Some(req) = requests.next().await? {
                    out.emit(hello(&req.greeting.unwrap_or_default()).into())
                        .await?;
                }
                Ok(())
            },
        )
    }

    /// Answers after a few pauses of the configured greet delay. A caller
    /// whose deadline is shorter gets `DeadlineExceeded`, and the work stops
    /// at that point instead of running to completion.
    async fn greet_with_deadline(
        &self,
        request: Request<GreetWithDeadlineRequest>,
    ) -> Result<Response<GreetWithDeadlineResponse>, tonic::Status> {
        let delay = self.config.greet_delay;
        dispatch::unary(
            &self.tracker,
            paths::GREET_WITH_DEADLINE,
            request,
            move |req: GreetWithDeadlineRequest| async move {
                for _step in 0..DEADLINE_STEPS {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(step = _step, "greeting slowly");
                    pace(delay).await;
                }
                let greeting = req.greeting.unwrap_or_default();
                Ok(GreetWithDeadlineResponse::from(first_name_only(&greeting)))
            },
        )
        .await
    }
}
