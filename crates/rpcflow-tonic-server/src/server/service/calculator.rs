use super::pace;
use crate::server::{
    config::ServerConfig,
    domain::calculator::{Average, PrimeFactors, RunningMax, square_root, sum},
    streaming::dispatch::{self, ResponseStream},
    tracker::CallTracker,
};
use rpcflow_tonic_core::proto::calculator::{
    ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
    PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
    SquareRootResponse, SumRequest, SumResponse, calculator_service_server::CalculatorService,
    paths,
};
use rpcflow::{Emitter, Status};
use std::sync::Arc;
use tonic::{Request, Response, Streaming};

/// `calculator.CalculatorService`: one method per interaction shape, plus a
/// unary method that reports invalid input as `InvalidArgument`.
#[derive(Clone)]
pub struct Calculator {
    config: ServerConfig,
    tracker: Arc<CallTracker>,
}

impl Calculator {
    pub const fn new(config: ServerConfig, tracker: Arc<CallTracker>) -> Self {
        Self { config, tracker }
    }
}

#[tonic::async_trait]
impl CalculatorService for Calculator {
    type PrimeNumberDecompositionStream = ResponseStream<PrimeNumberDecompositionResponse>;
    type FindMaximumStream = ResponseStream<FindMaximumResponse>;

    async fn sum(
        &self,
        request: Request<SumRequest>,
    ) -> Result<Response<SumResponse>, tonic::Status> {
        dispatch::unary(&self.tracker, paths::SUM, request, |req: SumRequest| async move {
            let result =
                sum(req.first_number, req.second_number).map_err(Status::from_classified)?;
            Ok(SumResponse { result })
        })
        .await
    }

    /// Streams the prime factors of the request, smallest first, pausing for
    /// the configured pacing after each one.
    async fn prime_number_decomposition(
        &self,
        request: Request<PrimeNumberDecompositionRequest>,
    ) -> Result<Response<Self::PrimeNumberDecompositionStream>, tonic::Status> {
        let pacing = self.config.stream_pacing;
        dispatch::server_streaming(
            &self.tracker,
            paths::PRIME_NUMBER_DECOMPOSITION,
            self.config.stream_buffer_size,
            request,
            move |req: PrimeNumberDecompositionRequest,
                  out: Emitter<PrimeNumberDecompositionResponse>| async move {
                for prime_factor in PrimeFactors::new(req.number) {
                    out.emit(PrimeNumberDecompositionResponse { prime_factor })
                        .await?;
                    pace(pacing).await;
                }
                Ok(())
            },
        )
    }

    async fn compute_average(
        &self,
        request: Request<Streaming<ComputeAverageRequest>>,
    ) -> Result<Response<ComputeAverageResponse>, tonic::Status> {
        dispatch::client_streaming(
            &self.tracker,
            paths::COMPUTE_AVERAGE,
            request,
            |mut requests: dispatch::Requests<ComputeAverageRequest>| async move {
                let mut average = Average::default();
                while let Some(req) = requests.next().await? {
                    average.push(req.number);
                }
                let average = average.finish().map_err(Status::from_classified)?;
                Ok(ComputeAverageResponse { average })
            },
        )
        .await
    }

    /// Answers every number with the maximum seen so far on this call.
    async fn find_maximum(
        &self,
        request: Request<Streaming<FindMaximumRequest>>,
    ) -> Result<Response<Self::FindMaximumStream>, tonic::Status> {
        dispatch::bidi(
            &self.tracker,
            paths::FIND_MAXIMUM,
            self.config.stream_buffer_size,
            request,
            |mut requests: dispatch::Requests<FindMaximumRequest>,
             out: Emitter<FindMaximumResponse>| async move {
                let mut running = RunningMax::default();
                while let Some(req) = requests.next().await? {
                    let maximum = running.observe(req.number);
                    out.emit(FindMaximumResponse { maximum }).await?;
                }
                Ok(())
            },
        )
    }

    async fn square_root(
        &self,
        request: Request<SquareRootRequest>,
    ) -> Result<Response<SquareRootResponse>, tonic::Status> {
        dispatch::unary(
            &self.tracker,
            paths::SQUARE_ROOT,
            request,
            |req: SquareRootRequest| async move {
                let number_root = square_root(req.number).map_err(Status::from_classified)?;
                Ok(SquareRootResponse { number_root })
            },
        )
        .await
    }
}
