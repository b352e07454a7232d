//! Demo client: one subcommand per method of the calculator and greet
//! services.
//!
//! ```bash
//! rpcflow-tonic-client primes 150
//! rpcflow-tonic-client --pacing-ms 200 maximum 4 7 2 19 4 6 32
//! rpcflow-tonic-client greet-deadline --timeout-ms 1000 Ada
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use core::{ops::ControlFlow, time::Duration};
use rpcflow::{CallOptions, Code, Status};
use rpcflow_tonic_core::{
    client::{CalculatorClient, GreetClient},
    proto::greet::Greeting,
    transport::GrpcConnection,
};
use tonic::codec::CompressionEncoding;

#[derive(Parser, Debug)]
#[command(
    name = "rpcflow-tonic-client",
    version,
    about = "Calls the calculator and greet services"
)]
struct Cli {
    /// Server endpoint.
    ///
    /// Environment variable: `SERVER_URL`
    #[arg(long, env = "SERVER_URL", default_value_t = String::from("http://127.0.0.1:50051"))]
    server_url: String,

    /// Pause after each streamed request, in milliseconds.
    ///
    /// Environment variable: `STREAM_PACING_MS`
    #[arg(long, env = "STREAM_PACING_MS", default_value_t = 1000)]
    pacing_ms: u64,

    /// Compress requests and ask for compressed responses.
    #[arg(long, value_enum)]
    compression: Option<Compression>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Adds two numbers (unary).
    Sum {
        #[arg(default_value_t = 3, allow_negative_numbers = true)]
        first: i64,
        #[arg(default_value_t = 10, allow_negative_numbers = true)]
        second: i64,
    },
    /// Streams the prime factors of a number (server streaming).
    Primes {
        #[arg(default_value_t = 120, allow_negative_numbers = true)]
        number: i64,
    },
    /// Averages a stream of numbers (client streaming).
    Average {
        #[arg(default_values_t = [1, 2, 3, 4], allow_negative_numbers = true)]
        numbers: Vec<i64>,
    },
    /// Keeps a running maximum (bidirectional).
    Maximum {
        #[arg(default_values_t = [4, 7, 2, 19, 4, 6, 32], allow_negative_numbers = true)]
        numbers: Vec<i32>,
    },
    /// Square root, rejecting negative numbers.
    Sqrt {
        #[arg(default_value_t = -2, allow_negative_numbers = true)]
        number: i32,
    },
    /// Greets one person (unary).
    Greet {
        #[arg(default_value = "Stephane")]
        first_name: String,
        #[arg(default_value = "Maarek")]
        last_name: String,
    },
    /// Greets one person many times (server streaming).
    GreetMany {
        #[arg(default_value = "Stephane")]
        first_name: String,
        #[arg(default_value = "Maarek")]
        last_name: String,
    },
    /// Greets a stream of people in one reply (client streaming).
    LongGreet {
        #[arg(default_values = ["Stephane", "John", "Lucy", "Mark", "Piper"])]
        first_names: Vec<String>,
    },
    /// Greets a stream of people one by one (bidirectional).
    GreetEveryone {
        #[arg(default_values = ["Stephane", "John", "Lucy", "Mark", "Piper"])]
        first_names: Vec<String>,
    },
    /// A slow greeting, bounded by a deadline.
    GreetDeadline {
        /// Deadline for the call, in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        #[arg(default_value = "Stephane")]
        first_name: String,
        #[arg(default_value = "Maarek")]
        last_name: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Compression {
    Zstd,
    Gzip,
    Deflate,
}

impl From<Compression> for CompressionEncoding {
    fn from(value: Compression) -> Self {
        match value {
            Compression::Zstd => Self::Zstd,
            Compression::Gzip => Self::Gzip,
            Compression::Deflate => Self::Deflate,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut conn = GrpcConnection::connect(cli.server_url.clone()).await?;
    if let Some(compression) = cli.compression {
        conn = conn
            .send_compressed(compression.into())
            .accept_compressed(compression.into());
    }
    let options = CallOptions::new().with_pacing(Duration::from_millis(cli.pacing_ms));

    if let Err(status) = run(cli.command, conn, options).await {
        report(&status);
        return Err(status.into());
    }
    Ok(())
}

async fn run(command: Command, conn: GrpcConnection, options: CallOptions) -> rpcflow::Result<()> {
    let calculator = CalculatorClient::new(conn.clone());
    let greeter = GreetClient::new(conn);

    match command {
        Command::Sum { first, second } => {
            let result = calculator.sum(first, second, &options).await?;
            println!("{first} + {second} = {result}");
        }
        Command::Primes { number } => {
            let count = calculator
                .prime_number_decomposition(number, &options, |factor| {
                    println!("factor: {factor}");
                    ControlFlow::Continue(())
                })
                .await?;
            println!("{number} has {count} prime factors");
        }
        Command::Average { numbers } => {
            let average = calculator
                .compute_average(futures::stream::iter(announce(numbers)), &options)
                .await?;
            println!("average: {average}");
        }
        Command::Maximum { numbers } => {
            let exchange = calculator
                .find_maximum(futures::stream::iter(announce(numbers)), &options, |max| {
                    println!("maximum so far: {max}");
                })
                .await?;
            println!(
                "sent {} numbers, received {} maximums",
                exchange.sent, exchange.received
            );
        }
        Command::Sqrt { number } => {
            let root = calculator.square_root(number, &options).await?;
            println!("square root of {number}: {root}");
        }
        Command::Greet {
            first_name,
            last_name,
        } => {
            let result = greeter
                .greet(Greeting::new(first_name, last_name), &options)
                .await?;
            println!("{result}");
        }
        Command::GreetMany {
            first_name,
            last_name,
        } => {
            greeter
                .greet_many_times(Greeting::new(first_name, last_name), &options, |line| {
                    println!("{line}");
                    ControlFlow::Continue(())
                })
                .await?;
        }
        Command::LongGreet { first_names } => {
            let greetings = first_names
                .into_iter()
                .map(|name| Greeting::new(name, "Maarek"));
            let result = greeter
                .long_greet(futures::stream::iter(announce(greetings)), &options)
                .await?;
            print!("{result}");
        }
        Command::GreetEveryone { first_names } => {
            let greetings = first_names
                .into_iter()
                .map(|name| Greeting::new(name, "Maarek"));
            greeter
                .greet_everyone(futures::stream::iter(announce(greetings)), &options, |line| {
                    print!("received: {line}");
                })
                .await?;
        }
        Command::GreetDeadline {
            timeout_ms,
            first_name,
            last_name,
        } => {
            let options = options.with_timeout(Duration::from_millis(timeout_ms));
            let result = greeter
                .greet_with_deadline(Greeting::new(first_name, last_name), &options)
                .await?;
            println!("{result}");
        }
    }
    Ok(())
}

/// Prints each request as it is handed to the call.
fn announce<T, I>(items: I) -> impl Iterator<Item = T> + Send + 'static
where
    T: core::fmt::Debug + Send + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
{
    items.into_iter().inspect(|item| println!("sending: {item:?}"))
}

fn report(status: &Status) {
    eprintln!("call failed with {}: {}", status.code(), status.message());
    match status.code() {
        Code::InvalidArgument => eprintln!("hint: probably sent a negative number"),
        Code::DeadlineExceeded => {
            eprintln!("hint: the deadline was exceeded, try a longer --timeout-ms");
        }
        _ => {}
    }
}
