use core::{ops::ControlFlow, time::Duration};
use futures::stream;
use rpcflow::{CallOptions, Code, Exchange};
use rpcflow_tonic_core::{
    client::{CalculatorClient, GreetClient},
    proto::{
        calculator::{
            SquareRootRequest, SumRequest, calculator_service_client::CalculatorServiceClient,
        },
        greet::Greeting,
    },
    transport::GrpcConnection,
};
use rpcflow_tonic_server::server::{config::ServerConfig, serve_with_incoming_shutdown};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;

struct TestServer {
    url: String,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve_with_incoming_shutdown(
            config,
            TcpListenerStream::new(listener),
            async {
                let _ = stopped.await;
            },
        ));
        Self {
            url: format!("http://{addr}"),
            stop: Some(stop),
            handle,
        }
    }

    async fn connect(&self) -> GrpcConnection {
        GrpcConnection::connect(self.url.clone()).await.unwrap()
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

/// Fast settings: no pacing, short greeting steps.
fn config() -> ServerConfig {
    ServerConfig {
        stream_pacing: Duration::ZERO,
        greet_delay: Duration::from_millis(20),
        greet_repeat: 3,
        shutdown_timeout: Duration::from_secs(1),
        ..ServerConfig::default()
    }
}

fn options() -> CallOptions {
    CallOptions::new().with_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn sum_adds_two_numbers() {
    let server = TestServer::start(config()).await;
    let calculator = CalculatorClient::new(server.connect().await);

    assert_eq!(calculator.sum(10, 5, &options()).await.unwrap(), 15);
    assert_eq!(calculator.sum(3, 10, &options()).await.unwrap(), 13);
    assert_eq!(calculator.sum(-7, 7, &options()).await.unwrap(), 0);

    let status = calculator.sum(i64::MAX, 1, &options()).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    server.stop().await;
}

#[tokio::test]
async fn prime_factors_stream_in_order() {
    let server = TestServer::start(config()).await;
    let calculator = CalculatorClient::new(server.connect().await);

    let mut factors = Vec::new();
    let count = calculator
        .prime_number_decomposition(150, &options(), |factor| {
            factors.push(factor);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
    assert_eq!(factors, [2, 3, 5, 5]);
    assert_eq!(count, 4);

    let count = calculator
        .prime_number_decomposition(1, &options(), |_| ControlFlow::Continue(()))
        .await
        .unwrap();
    assert_eq!(count, 0);

    server.stop().await;
}

#[tokio::test]
async fn consumer_can_stop_a_server_stream_early() {
    let server = TestServer::start(ServerConfig {
        stream_pacing: Duration::from_millis(50),
        ..config()
    })
    .await;
    let calculator = CalculatorClient::new(server.connect().await);

    let mut factors = Vec::new();
    let count = calculator
        .prime_number_decomposition(1 << 40, &options(), |factor| {
            factors.push(factor);
            if factors.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(factors, [2, 2]);

    server.stop().await;
}

#[tokio::test]
async fn average_of_a_client_stream() {
    let server = TestServer::start(config()).await;
    let calculator = CalculatorClient::new(server.connect().await);

    let average = calculator
        .compute_average(stream::iter([1, 2, 3, 4]), &options())
        .await
        .unwrap();
    assert_eq!(average, 2.5);

    let status = calculator
        .compute_average(stream::empty(), &options())
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    server.stop().await;
}

#[tokio::test]
async fn running_maximum_over_a_bidi_stream() {
    let server = TestServer::start(config()).await;
    let calculator = CalculatorClient::new(server.connect().await);

    let mut maximums = Vec::new();
    let exchange = calculator
        .find_maximum(
            stream::iter([4, 7, 2, 19, 4, 6, 32]),
            &options().with_pacing(Duration::from_millis(5)),
            |max| maximums.push(max),
        )
        .await
        .unwrap();
    assert_eq!(maximums, [4, 7, 7, 19, 19, 19, 32]);
    assert_eq!(
        exchange,
        Exchange {
            sent: 7,
            received: 7
        }
    );

    let mut maximums = Vec::new();
    calculator
        .find_maximum(stream::iter([-5, -9, -2]), &options(), |max| {
            maximums.push(max);
        })
        .await
        .unwrap();
    assert_eq!(maximums, [-5, -5, -2]);

    server.stop().await;
}

#[tokio::test]
async fn negative_square_root_is_invalid_argument() {
    let server = TestServer::start(config()).await;
    let calculator = CalculatorClient::new(server.connect().await);

    let root = calculator.square_root(10, &options()).await.unwrap();
    assert!((root - 3.1623).abs() < 1e-4);

    let status = calculator.square_root(-2, &options()).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "Received a negative number: -2");

    server.stop().await;
}

#[tokio::test]
async fn greetings_in_every_shape() {
    let server = TestServer::start(config()).await;
    let greeter = GreetClient::new(server.connect().await);
    let ada = Greeting::new("Ada", "Lovelace");

    assert_eq!(
        greeter.greet(ada.clone(), &options()).await.unwrap(),
        "Ada Lovelace"
    );

    let mut lines = Vec::new();
    greeter
        .greet_many_times(ada.clone(), &options(), |line| {
            lines.push(line);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
    assert_eq!(lines, ["0: Ada Lovelace", "1: Ada Lovelace", "2: Ada Lovelace"]);

    let people = [Greeting::new("Mike", "Doe"), Greeting::new("Lucy", "Doe")];
    let long = greeter
        .long_greet(stream::iter(people.clone()), &options())
        .await
        .unwrap();
    assert_eq!(long, "Hello Mike Doe!\nHello Lucy Doe!\n");

    let mut replies = Vec::new();
    let exchange = greeter
        .greet_everyone(stream::iter(people), &options(), |line| replies.push(line))
        .await
        .unwrap();
    assert_eq!(replies, ["Hello Mike Doe!\n", "Hello Lucy Doe!\n"]);
    assert_eq!(exchange.received, 2);

    server.stop().await;
}

#[tokio::test]
async fn slow_greeting_within_deadline() {
    let server = TestServer::start(config()).await;
    let greeter = GreetClient::new(server.connect().await);

    let reply = greeter
        .greet_with_deadline(
            Greeting::new("Ada", "Lovelace"),
            &CallOptions::new().with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(reply, "Hello Ada");

    server.stop().await;
}

#[tokio::test]
async fn slow_greeting_past_deadline() {
    let server = TestServer::start(ServerConfig {
        greet_delay: Duration::from_millis(300),
        ..config()
    })
    .await;
    let greeter = GreetClient::new(server.connect().await);

    let status = greeter
        .greet_with_deadline(
            Greeting::new("Ada", "Lovelace"),
            &CallOptions::new().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::DeadlineExceeded);

    server.stop().await;
}

#[tokio::test]
async fn generated_tonic_client_interoperates() {
    let server = TestServer::start(config()).await;
    let mut client = CalculatorServiceClient::connect(server.url.clone())
        .await
        .unwrap();

    let response = client
        .sum(SumRequest {
            first_number: 40,
            second_number: 2,
        })
        .await
        .unwrap();
    assert_eq!(response.into_inner().result, 42);

    let status = client
        .square_root(SquareRootRequest { number: -9 })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert_eq!(status.message(), "Received a negative number: -9");

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn shutdown_cancels_calls_that_outlive_the_drain() {
    let server = TestServer::start(ServerConfig {
        greet_delay: Duration::from_millis(200),
        greet_repeat: 1_000,
        shutdown_timeout: Duration::ZERO,
        ..config()
    })
    .await;
    let greeter = GreetClient::new(server.connect().await);

    let (first_tx, first_rx) = oneshot::channel();
    let call = tokio::spawn(async move {
        let mut first_tx = Some(first_tx);
        greeter
            .greet_many_times(Greeting::new("Ada", "Lovelace"), &CallOptions::new(), |_| {
                if let Some(tx) = first_tx.take() {
                    let _ = tx.send(());
                }
                ControlFlow::Continue(())
            })
            .await
    });

    first_rx.await.unwrap();
    server.stop().await;

    let status = call.await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::Cancelled);
}
