#![doc = include_str!("../README.md")]

mod call;
mod channel;
mod connection;
mod coordinator;
mod deadline;
mod driver;
mod handler;
mod lifecycle;
mod mapper;
mod status;

#[cfg(test)]
mod tests;

pub use crate::call::*;
pub use crate::channel::*;
pub use crate::connection::*;
pub use crate::coordinator::Exchange;
pub use crate::deadline::*;
pub use crate::handler::*;
pub use crate::lifecycle::*;
pub use crate::mapper::*;
pub use crate::status::*;
