//! gRPC message and service definitions.
//!
//! The messages are `prost` structs matching the schemas in `proto/`; the
//! client and server stubs are generated by `build.rs`.
//!
//! ## Services
//!
//! - [`calculator`] - `calculator.CalculatorService`, one method per
//!   interaction shape plus an error-reporting unary call.
//! - [`greet`] - `greet.GreetService`, the same shapes over [`Greeting`]s,
//!   plus a slow unary call meant to be made with a deadline.
//!
//! [`Greeting`]: greet::Greeting

/// `calculator.CalculatorService`.
pub mod calculator {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct SumRequest {
        #[prost(int64, tag = "1")]
        pub first_number: i64,
        #[prost(int64, tag = "2")]
        pub second_number: i64,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct SumResponse {
        #[prost(int64, tag = "1")]
        pub result: i64,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct PrimeNumberDecompositionRequest {
        #[prost(int64, tag = "1")]
        pub number: i64,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct PrimeNumberDecompositionResponse {
        #[prost(int64, tag = "1")]
        pub prime_factor: i64,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct ComputeAverageRequest {
        #[prost(int64, tag = "1")]
        pub number: i64,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct ComputeAverageResponse {
        #[prost(double, tag = "1")]
        pub average: f64,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct FindMaximumRequest {
        #[prost(int32, tag = "1")]
        pub number: i32,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct FindMaximumResponse {
        #[prost(int32, tag = "1")]
        pub maximum: i32,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct SquareRootRequest {
        #[prost(int32, tag = "1")]
        pub number: i32,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct SquareRootResponse {
        #[prost(double, tag = "1")]
        pub number_root: f64,
    }

    /// Full method paths, as sent in the HTTP/2 `:path` pseudo-header.
    pub mod paths {
        pub const SUM: &str = "/calculator.CalculatorService/Sum";
        pub const PRIME_NUMBER_DECOMPOSITION: &str =
            "/calculator.CalculatorService/PrimeNumberDecomposition";
        pub const COMPUTE_AVERAGE: &str = "/calculator.CalculatorService/ComputeAverage";
        pub const FIND_MAXIMUM: &str = "/calculator.CalculatorService/FindMaximum";
        pub const SQUARE_ROOT: &str = "/calculator.CalculatorService/SquareRoot";
    }

    include!(concat!(env!("OUT_DIR"), "/calculator.CalculatorService.rs"));
}

/// `greet.GreetService`.
pub mod greet {
    #[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
    pub struct Greeting {
        #[prost(string, tag = "1")]
        pub first_name: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub last_name: ::prost::alloc::string::String,
    }

    impl Greeting {
        pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
            Self {
                first_name: first_name.into(),
                last_name: last_name.into(),
            }
        }
    }

    /// Declares a request/response pair that carries a [`Greeting`] in and a
    /// string result out.
    macro_rules! greeting_messages {
        ($($request:ident => $response:ident),+ $(,)?) => {
            $(
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct $request {
                    #[prost(message, optional, tag = "1")]
                    pub greeting: ::core::option::Option<Greeting>,
                }

                impl From<Greeting> for $request {
                    fn from(greeting: Greeting) -> Self {
                        Self {
                            greeting: Some(greeting),
                        }
                    }
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct $response {
                    #[prost(string, tag = "1")]
                    pub result: ::prost::alloc::string::String,
                }

                impl From<String> for $response {
                    fn from(result: String) -> Self {
                        Self { result }
                    }
                }
            )+
        };
    }

    greeting_messages! {
        GreetRequest => GreetResponse,
        GreetManyTimesRequest => GreetManyTimesResponse,
        LongGreetRequest => LongGreetResponse,
        GreetEveryoneRequest => GreetEveryoneResponse,
        GreetWithDeadlineRequest => GreetWithDeadlineResponse,
    }

    /// Full method paths, as sent in the HTTP/2 `:path` pseudo-header.
    pub mod paths {
        pub const GREET: &str = "/greet.GreetService/Greet";
        pub const GREET_MANY_TIMES: &str = "/greet.GreetService/GreetManyTimes";
        pub const LONG_GREET: &str = "/greet.GreetService/LongGreet";
        pub const GREET_EVERYONE: &str = "/greet.GreetService/GreetEveryone";
        pub const GREET_WITH_DEADLINE: &str = "/greet.GreetService/GreetWithDeadline";
    }

    include!(concat!(env!("OUT_DIR"), "/greet.GreetService.rs"));
}
