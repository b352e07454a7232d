#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

pub mod client;
pub mod proto;
pub mod transport;

// Public re-export so downstream crates can reach the protocol core via
// `rpcflow_tonic_core::rpcflow`
pub use rpcflow;
