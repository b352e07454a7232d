//! Defaults shared by the server binary, the demo client and the tests.

use core::time::Duration;

/// The address the server listens on unless configured otherwise.
pub const DEFAULT_ADDR: &str = "127.0.0.1:50051";

/// How many messages may be in flight per direction of one call before the
/// sender waits for the receiver.
pub const DEFAULT_STREAM_BUFFER: usize = 8;

/// The pause the demo services and client take between streamed messages.
pub const DEFAULT_PACING: Duration = Duration::from_millis(1000);

/// How long the greet service takes per step of a slow greeting.
pub const DEFAULT_GREET_DELAY: Duration = Duration::from_millis(1000);

/// How many greetings `GreetManyTimes` streams back.
pub const DEFAULT_GREET_REPEAT: u32 = 10;
