use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use rpcflow_tonic_core::types::{
    DEFAULT_ADDR, DEFAULT_GREET_DELAY, DEFAULT_GREET_REPEAT, DEFAULT_PACING, DEFAULT_STREAM_BUFFER,
};

/// Runtime configuration for the `rpcflow-tonic-server` binary.
///
/// These settings control buffering and pacing of the streaming methods, the
/// speed of the slow greeting, and how long shutdown waits for in-flight
/// calls. All values are parsed from CLI arguments or environment variables.
/// The defaults pace the demo streams at one message per second so the
/// interleaving of the two directions can be watched from a terminal.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rpcflow-tonic-server",
    version,
    about = "A gRPC server for the streaming calculator and greet services"
)]
pub struct CliArgs {
    /// Capacity of the response buffer between a handler and its gRPC stream.
    ///
    /// This affects how many responses can be queued before the handler must
    /// wait for the client to read. Must be greater than zero.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = DEFAULT_STREAM_BUFFER)]
    pub stream_buffer_size: usize,

    /// Pause between streamed responses, in milliseconds. Zero streams as fast
    /// as the client reads.
    ///
    /// Environment variable: `STREAM_PACING_MS`
    #[arg(long, env = "STREAM_PACING_MS", default_value_t = 1000)]
    pub stream_pacing_ms: u64,

    /// Duration of each of the three steps of `GreetWithDeadline`, in
    /// milliseconds.
    ///
    /// Environment variable: `GREET_DELAY_MS`
    #[arg(long, env = "GREET_DELAY_MS", default_value_t = 1000)]
    pub greet_delay_ms: u64,

    /// How many greetings `GreetManyTimes` streams back.
    ///
    /// Environment variable: `GREET_REPEAT`
    #[arg(long, env = "GREET_REPEAT", default_value_t = DEFAULT_GREET_REPEAT)]
    pub greet_repeat: u32,

    /// Seconds to wait for in-flight calls during shutdown before cancelling
    /// them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/rpcflow.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub stream_buffer_size: usize,
    pub stream_pacing: Duration,
    pub greet_delay: Duration,
    pub greet_repeat: u32,
    pub shutdown_timeout: Duration,
    pub server_addr: String,
    pub uds: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stream_buffer_size: DEFAULT_STREAM_BUFFER,
            stream_pacing: DEFAULT_PACING,
            greet_delay: DEFAULT_GREET_DELAY,
            greet_repeat: DEFAULT_GREET_REPEAT,
            shutdown_timeout: Duration::from_secs(3),
            server_addr: DEFAULT_ADDR.to_owned(),
            uds: false,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.server_addr.is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        Ok(Self {
            stream_buffer_size: args.stream_buffer_size,
            stream_pacing: Duration::from_millis(args.stream_pacing_ms),
            greet_delay: Duration::from_millis(args.greet_delay_ms),
            greet_repeat: args.greet_repeat,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}
