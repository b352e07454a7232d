//! The calculator and greet services behind a tonic server.
//!
//! [`serve_with_incoming_shutdown`] is the whole server: both services plus
//! health reporting, grpc-web and CORS, running over any stream of accepted
//! connections until the given shutdown future resolves. The binary feeds it
//! a TCP or Unix listener and OS signals; the end-to-end tests feed it an
//! ephemeral port and a oneshot.

pub mod config;
pub mod domain;
pub mod service;
pub mod streaming;
pub mod telemetry;
pub mod tracker;

use crate::server::{
    config::ServerConfig,
    service::{calculator::Calculator, greet::Greeter},
    tracker::CallTracker,
};
use core::future::Future;
use futures::Stream;
use rpcflow_tonic_core::proto::{
    calculator::calculator_service_server::CalculatorServiceServer,
    greet::greet_service_server::GreetServiceServer,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::{
    codec::CompressionEncoding,
    transport::{Server, server::Connected},
};
use tonic_health::server::HealthReporter;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Serves both services on `incoming` until `signal` resolves, then shuts
/// down gracefully.
///
/// On shutdown the health service reports both services as not serving, new
/// calls are refused with `Unavailable`, in-flight calls get up to
/// `config.shutdown_timeout` to finish, and whatever is left is cancelled.
pub async fn serve_with_incoming_shutdown<I, IO, IE, F>(
    config: ServerConfig,
    incoming: I,
    signal: F,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let tracker = Arc::new(CallTracker::new(config.shutdown_timeout));
    let calculator = Calculator::new(config.clone(), Arc::clone(&tracker));
    let greeter = Greeter::new(config, Arc::clone(&tracker));

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<CalculatorServiceServer<Calculator>>()
        .await;
    health_reporter
        .set_serving::<GreetServiceServer<Greeter>>()
        .await;

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(build_calculator_service(calculator))
        .add_service(build_greet_service(greeter))
        .serve_with_incoming_shutdown(incoming, drain(signal, tracker, health_reporter))
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Server shut down successfully");
    Ok(())
}

fn build_calculator_service(service: Calculator) -> CalculatorServiceServer<Calculator> {
    CalculatorServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

fn build_greet_service(service: Greeter) -> GreetServiceServer<Greeter> {
    GreetServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn drain<F: Future<Output = ()>>(
    signal: F,
    tracker: Arc<CallTracker>,
    health_reporter: HealthReporter,
) {
    signal.await;

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<CalculatorServiceServer<Calculator>>()
        .await;
    health_reporter
        .set_not_serving::<GreetServiceServer<Greeter>>()
        .await;

    // 2. Drain, then cancel what is left
    tracker.shutdown().await;
}
