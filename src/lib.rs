//! Conformance-testing client for the eth wire protocol.
//!
//! Dials a node, runs the Hello handshake and eth version negotiation, validates the
//! peer's Status against a reference chain and issues block-header queries while
//! serving the peer's own requests.

pub mod chain;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod network;
pub mod utils;

pub use chain::{Chain, ChainOracle};
pub use config::ClientConfig;
pub use network::{dial, dial_with_newest_generation, Connection, Message, RequestMode};
pub use utils::{ConformanceError, Result};

#[cfg(test)]
mod tests;
