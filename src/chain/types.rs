use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::serde_helpers::{as_hex, bytes_as_hex, bytes_from_hex, decode_fixed_hex, from_hex};

/// 32-byte hash (block hashes, state roots).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct H256(
    #[serde(serialize_with = "as_hex", deserialize_with = "from_hex")] pub [u8; 32],
);

impl H256 {
    pub const fn zero() -> Self {
        H256([0u8; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for H256 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed_hex::<32>(s).map(H256)
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

/// 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Address(
    #[serde(serialize_with = "as_hex", deserialize_with = "from_hex")] pub [u8; 20],
);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Compact summary of activated forks, compared structurally during status exchange.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ForkId {
    /// CRC32 checksum of the genesis hash and passed fork block numbers
    #[serde(serialize_with = "as_hex", deserialize_with = "from_hex")]
    pub hash: [u8; 4],
    /// Next upcoming fork block number, 0 if none is scheduled
    pub next: u64,
}

impl fmt::Debug for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForkId {{ hash: 0x{}, next: {} }}", hex::encode(self.hash), self.next)
    }
}

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Origin of a header query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashOrNumber {
    Hash(H256),
    Number(u64),
}

impl Default for HashOrNumber {
    fn default() -> Self {
        HashOrNumber::Number(0)
    }
}

impl FromStr for HashOrNumber {
    type Err = String;

    /// `0x`-prefixed 32-byte hex is a hash, anything else must be a block number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("0x") {
            s.parse::<H256>().map(HashOrNumber::Hash)
        } else {
            s.parse::<u64>()
                .map(HashOrNumber::Number)
                .map_err(|e| format!("invalid block number {s:?}: {e}"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent_hash: H256,
    pub number: u64,
    pub timestamp: u64,
    pub difficulty: u128,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub state_root: H256,
    pub transactions_root: H256,
    #[serde(serialize_with = "bytes_as_hex", deserialize_with = "bytes_from_hex", default)]
    pub extra_data: Vec<u8>,
}

impl BlockHeader {
    /// SHA-256 over the header fields in declaration order.
    pub fn hash(&self) -> H256 {
        let mut h = Sha256::new();
        h.update(self.parent_hash.0);
        h.update(self.number.to_be_bytes());
        h.update(self.timestamp.to_be_bytes());
        h.update(self.difficulty.to_be_bytes());
        h.update(self.gas_limit.to_be_bytes());
        h.update(self.gas_used.to_be_bytes());
        h.update(self.state_root.0);
        h.update(self.transactions_root.0);
        h.update((self.extra_data.len() as u64).to_be_bytes());
        h.update(&self.extra_data);
        finish(h)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: u128,
    #[serde(serialize_with = "bytes_as_hex", deserialize_with = "bytes_from_hex", default)]
    pub data: Vec<u8>,
}

impl Transaction {
    pub fn hash(&self) -> H256 {
        let mut h = Sha256::new();
        h.update(self.nonce.to_be_bytes());
        h.update(self.gas_price.to_be_bytes());
        h.update(self.gas.to_be_bytes());
        match &self.to {
            Some(addr) => {
                h.update([1u8]);
                h.update(addr.0);
            }
            None => h.update([0u8]),
        }
        h.update(self.value.to_be_bytes());
        h.update(&self.data);
        finish(h)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockBody {
    pub transactions: Vec<Transaction>,
    pub uncles: Vec<BlockHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }
}

fn finish(h: Sha256) -> H256 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&h.finalize());
    H256(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_hash_covers_extra_data() {
        let base = BlockHeader { number: 7, difficulty: 100, ..Default::default() };
        let mut other = base.clone();
        other.extra_data = vec![1];
        assert_ne!(base.hash(), other.hash());
        assert_eq!(base.hash(), base.clone().hash());
    }

    #[test]
    fn header_hash_is_sha256_of_the_fields_in_order() {
        let header = BlockHeader {
            parent_hash: H256([1; 32]),
            number: 2,
            timestamp: 3,
            difficulty: 4,
            gas_limit: 5,
            gas_used: 6,
            state_root: H256([7; 32]),
            transactions_root: H256([8; 32]),
            extra_data: b"xy".to_vec(),
        };
        let mut h = Sha256::new();
        h.update([1u8; 32]);
        h.update(2u64.to_be_bytes());
        h.update(3u64.to_be_bytes());
        h.update(4u128.to_be_bytes());
        h.update(5u64.to_be_bytes());
        h.update(6u64.to_be_bytes());
        h.update([7u8; 32]);
        h.update([8u8; 32]);
        h.update(2u64.to_be_bytes());
        h.update(b"xy");
        assert_eq!(header.hash(), finish(h));

        let mut moved = header.clone();
        moved.gas_used = 60;
        assert_ne!(moved.hash(), header.hash());
    }

    #[test]
    fn hash_or_number_parsing() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert_eq!(
            hash.parse::<HashOrNumber>().unwrap(),
            HashOrNumber::Hash(H256([0xab; 32]))
        );
        assert_eq!("42".parse::<HashOrNumber>().unwrap(), HashOrNumber::Number(42));
        assert!("0x1234".parse::<HashOrNumber>().is_err());
        assert!("forty".parse::<HashOrNumber>().is_err());
    }

    #[test]
    fn hashes_are_hex_in_json_and_raw_in_bincode() {
        let h = H256([0x11; 32]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "11".repeat(32)));
        assert_eq!(serde_json::from_str::<H256>(&json).unwrap(), h);

        let bin = bincode::serialize(&h).unwrap();
        assert_eq!(bincode::deserialize::<H256>(&bin).unwrap(), h);
    }
}
