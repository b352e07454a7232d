//! The business logic behind the two services.
//!
//! Everything here is synchronous and free of transport types: the service
//! layer feeds it decoded messages and turns its errors into call statuses
//! through [`rpcflow::Classify`].

pub mod calculator;
pub mod greet;
