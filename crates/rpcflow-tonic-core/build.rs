/// Builds the gRPC client and server stubs for the `calculator` and `greet`
/// services using `tonic-build`.
///
/// The message types are hand-written `prost` structs in `src/proto.rs` (the
/// schemas are mirrored in `proto/` for non-Rust clients), so the services
/// are described with the manual builder instead of compiling `.proto` files.
/// No `protoc` is needed at build time.
///
/// # Output
///
/// One file per service is written to `OUT_DIR`, named
/// `{package}.{Service}.rs`, and pulled in by `src/proto.rs`:
///
/// ```rust,ignore
/// pub mod calculator {
///     include!(concat!(env!("OUT_DIR"), "/calculator.CalculatorService.rs"));
/// }
/// ```
///
/// # Panics
///
/// This function will `panic!` if code generation fails.
use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic_prost::ProstCodec";

/// Which directions of a method stream.
#[derive(Clone, Copy)]
enum Shape {
    Unary,
    ServerStreaming,
    ClientStreaming,
    Bidi,
}

fn method(package: &str, name: &str, route: &str, shape: Shape) -> Method {
    let builder = Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::proto::{package}::{route}Request"))
        .output_type(format!("crate::proto::{package}::{route}Response"))
        .codec_path(CODEC);
    let builder = match shape {
        Shape::Unary => builder,
        Shape::ServerStreaming => builder.server_streaming(),
        Shape::ClientStreaming => builder.client_streaming(),
        Shape::Bidi => builder.client_streaming().server_streaming(),
    };
    builder.build()
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let calculator = Service::builder()
        .name("CalculatorService")
        .package("calculator")
        .method(method("calculator", "sum", "Sum", Shape::Unary))
        .method(method(
            "calculator",
            "prime_number_decomposition",
            "PrimeNumberDecomposition",
            Shape::ServerStreaming,
        ))
        .method(method(
            "calculator",
            "compute_average",
            "ComputeAverage",
            Shape::ClientStreaming,
        ))
        .method(method(
            "calculator",
            "find_maximum",
            "FindMaximum",
            Shape::Bidi,
        ))
        .method(method(
            "calculator",
            "square_root",
            "SquareRoot",
            Shape::Unary,
        ))
        .build();

    let greet = Service::builder()
        .name("GreetService")
        .package("greet")
        .method(method("greet", "greet", "Greet", Shape::Unary))
        .method(method(
            "greet",
            "greet_many_times",
            "GreetManyTimes",
            Shape::ServerStreaming,
        ))
        .method(method(
            "greet",
            "long_greet",
            "LongGreet",
            Shape::ClientStreaming,
        ))
        .method(method(
            "greet",
            "greet_everyone",
            "GreetEveryone",
            Shape::Bidi,
        ))
        .method(method(
            "greet",
            "greet_with_deadline",
            "GreetWithDeadline",
            Shape::Unary,
        ))
        .build();

    Builder::new().compile(&[calculator, greet]);
}
