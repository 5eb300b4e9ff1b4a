//! Reference chain: the trusted source of headers and chain identity.
//!
//! - `ChainOracle`: what the protocol engine consumes (status validation, serving
//!   inbound header queries)
//! - `Chain`: in-memory implementation loadable from a JSON chain file

pub mod memory;
pub mod types;

pub use memory::{Chain, ChainFile};
pub use types::{Address, Block, BlockBody, BlockHeader, ForkId, HashOrNumber, Transaction, H256};

use thiserror::Error;

use crate::network::message::GetBlockHeaders;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("no block headers requested")]
    NoHeadersRequested,
    #[error("no headers found for origin {0:?}")]
    UnknownOrigin(HashOrNumber),
    #[error("chain has no blocks")]
    Empty,
    #[error("could not load chain: {0}")]
    Load(String),
}

/// Source of truth for a reference chain's identity fields and headers.
pub trait ChainOracle: Send + Sync {
    fn head_hash(&self) -> H256;

    fn total_difficulty(&self) -> u128;

    fn fork_id(&self) -> ForkId;

    fn genesis_hash(&self) -> H256;

    fn network_id(&self) -> u64;

    /// Answer a header query. Implementations decide whether a query running past
    /// the chain's bounds is an error or a shorter answer.
    fn get_headers(&self, request: &GetBlockHeaders) -> Result<Vec<BlockHeader>, ChainError>;

    /// Bodies for the given block hashes, skipping unknown ones.
    fn get_bodies(&self, _hashes: &[H256]) -> Vec<BlockBody> {
        Vec::new()
    }
}
