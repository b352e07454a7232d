//! Greeting text. A request without a greeting greets nobody in particular:
//! the names are treated as empty.

use rpcflow_tonic_core::proto::greet::Greeting;

pub fn full_name(greeting: &Greeting) -> String {
    format!("{} {}", greeting.first_name, greeting.last_name)
}

/// `"Hello first last!\n"`, one line of a long or shared greeting.
pub fn hello(greeting: &Greeting) -> String {
    format!("Hello {}!\n", full_name(greeting))
}

/// The `index`-th line of a repeated greeting.
pub fn numbered(index: u32, greeting: &Greeting) -> String {
    format!("{index}: {}", full_name(greeting))
}

/// The reply to a slow greeting.
pub fn first_name_only(greeting: &Greeting) -> String {
    format!("Hello {}", greeting.first_name)
}

/// Accumulates one greeting line per request.
#[derive(Debug, Clone, Default)]
pub struct LongGreeting {
    text: String,
}

impl LongGreeting {
    pub fn push(&mut self, greeting: &Greeting) {
        self.text.push_str(&hello(greeting));
    }

    pub fn finish(self) -> String {
        self.text
    }
}
