use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::types::{BlockBody, BlockHeader, ForkId, HashOrNumber, H256};
use crate::chain::{ChainError, ChainOracle};
use crate::network::message::GetBlockHeaders;

/// On-disk layout of a reference chain (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainFile {
    pub network_id: u64,
    pub fork_id: ForkId,
    /// Headers ordered from genesis upwards
    pub headers: Vec<BlockHeader>,
    /// Optional bodies, keyed by the header at the same position
    #[serde(default)]
    pub bodies: Vec<BlockBody>,
}

/// In-memory reference chain. Headers are kept in insertion order; block `i` is the
/// `i`-th header, so skips walk positions rather than trusting header numbers.
#[derive(Debug, Clone)]
pub struct Chain {
    network_id: u64,
    fork_id: ForkId,
    headers: Vec<BlockHeader>,
    by_hash: HashMap<H256, usize>,
    bodies: HashMap<H256, BlockBody>,
    total_difficulty: u128,
}

impl Chain {
    pub fn new(network_id: u64, fork_id: ForkId, headers: Vec<BlockHeader>) -> Result<Self, ChainError> {
        if headers.is_empty() {
            return Err(ChainError::Empty);
        }
        let by_hash = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.hash(), i))
            .collect();
        let total_difficulty = headers
            .iter()
            .fold(0u128, |td, h| td.saturating_add(h.difficulty));
        Ok(Self {
            network_id,
            fork_id,
            headers,
            by_hash,
            bodies: HashMap::new(),
            total_difficulty,
        })
    }

    /// Attach bodies; `bodies[i]` belongs to the `i`-th header.
    pub fn with_bodies(mut self, bodies: Vec<BlockBody>) -> Self {
        for (header, body) in self.headers.iter().zip(bodies) {
            self.bodies.insert(header.hash(), body);
        }
        self
    }

    pub fn from_file(file: ChainFile) -> Result<Self, ChainError> {
        Ok(Self::new(file.network_id, file.fork_id, file.headers)?.with_bodies(file.bodies))
    }

    pub fn from_json_str(s: &str) -> Result<Self, ChainError> {
        let file: ChainFile = serde_json::from_str(s).map_err(|e| ChainError::Load(e.to_string()))?;
        Self::from_file(file)
    }

    /// Load a chain from a JSON chain file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ChainError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| ChainError::Load(format!("{}: {e}", path.display())))?;
        let chain = Self::from_json_str(&data)?;
        debug!("loaded chain with {} blocks from {}", chain.len(), path.display());
        Ok(chain)
    }

    /// Deterministic linked chain of `len` blocks with difficulty `1000 + i`. Handy for
    /// harness setups that need a plausible chain without a chain file.
    pub fn synthetic(network_id: u64, fork_id: ForkId, len: usize) -> Result<Self, ChainError> {
        let mut headers: Vec<BlockHeader> = Vec::with_capacity(len);
        for i in 0..len as u64 {
            let parent_hash = headers.last().map(BlockHeader::hash).unwrap_or_default();
            headers.push(BlockHeader {
                parent_hash,
                number: i,
                timestamp: 1_600_000_000 + i * 13,
                difficulty: 1000 + u128::from(i),
                gas_limit: 8_000_000,
                gas_used: 21_000 * (i % 5),
                state_root: H256([i as u8; 32]),
                transactions_root: H256::zero(),
                extra_data: format!("block-{i}").into_bytes(),
            });
        }
        Self::new(network_id, fork_id, headers)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn header(&self, index: usize) -> Option<&BlockHeader> {
        self.headers.get(index)
    }

    pub fn head(&self) -> &BlockHeader {
        // non-empty by construction
        &self.headers[self.headers.len() - 1]
    }

    pub fn genesis(&self) -> &BlockHeader {
        &self.headers[0]
    }

    fn position(&self, origin: &HashOrNumber) -> Option<usize> {
        match origin {
            HashOrNumber::Hash(hash) => self.by_hash.get(hash).copied(),
            HashOrNumber::Number(number) => self.headers.iter().position(|h| h.number == *number),
        }
    }
}

impl ChainOracle for Chain {
    fn head_hash(&self) -> H256 {
        self.head().hash()
    }

    fn total_difficulty(&self) -> u128 {
        self.total_difficulty
    }

    fn fork_id(&self) -> ForkId {
        self.fork_id
    }

    fn genesis_hash(&self) -> H256 {
        self.genesis().hash()
    }

    fn network_id(&self) -> u64 {
        self.network_id
    }

    /// Walks `skip + 1` blocks per step from the origin and stops early at either end
    /// of the chain, so the answer may hold fewer than `amount` headers.
    fn get_headers(&self, request: &GetBlockHeaders) -> Result<Vec<BlockHeader>, ChainError> {
        if request.amount < 1 {
            return Err(ChainError::NoHeadersRequested);
        }
        let start = self
            .position(&request.origin)
            .ok_or(ChainError::UnknownOrigin(request.origin))?;
        let step = usize::try_from(request.skip).unwrap_or(usize::MAX).saturating_add(1);

        let mut headers = Vec::new();
        let mut pos = Some(start);
        while let Some(p) = pos {
            if headers.len() as u64 >= request.amount || p >= self.headers.len() {
                break;
            }
            headers.push(self.headers[p].clone());
            pos = if request.reverse {
                p.checked_sub(step)
            } else {
                p.checked_add(step)
            };
        }
        Ok(headers)
    }

    fn get_bodies(&self, hashes: &[H256]) -> Vec<BlockBody> {
        hashes
            .iter()
            .filter_map(|h| self.bodies.get(h).cloned())
            .collect()
    }
}
