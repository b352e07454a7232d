//! gRPC service implementations.
//!
//! - [`calculator::Calculator`] serves `calculator.CalculatorService`.
//! - [`greet::Greeter`] serves `greet.GreetService`.
//!
//! Both share one [`CallTracker`](crate::server::tracker::CallTracker), so a
//! shutdown drains and cancels calls across services together.

use core::time::Duration;

pub mod calculator;
pub mod greet;

/// Waits between streamed messages. The handler runs under its call's
/// supervisor, so a deadline or cancellation interrupts the wait.
async fn pace(interval: Duration) {
    if !interval.is_zero() {
        tokio::time::sleep(interval).await;
    }
}
