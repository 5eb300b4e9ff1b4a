//! Wire message catalog. Codes are a stable cross-peer contract: base-protocol
//! messages occupy 0x00..0x0f, eth messages start at [`codes::BASE_PROTOCOL_LENGTH`].
//!
//! Payloads are bincode-encoded. The eth/66 generation wraps request/response
//! payloads as `{ request_id, packet }`; [`Message::decode_correlated`] unwraps them.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::types::{Block, BlockBody, BlockHeader, ForkId, HashOrNumber, Transaction, H256};

pub mod codes {
    pub const HELLO: u64 = 0x00;
    pub const DISCONNECT: u64 = 0x01;
    pub const PING: u64 = 0x02;
    pub const PONG: u64 = 0x03;

    /// Number of codes reserved for the base protocol
    pub const BASE_PROTOCOL_LENGTH: u64 = 16;

    pub const STATUS: u64 = BASE_PROTOCOL_LENGTH;
    pub const NEW_BLOCK_HASHES: u64 = BASE_PROTOCOL_LENGTH + 1;
    pub const TRANSACTIONS: u64 = BASE_PROTOCOL_LENGTH + 2;
    pub const GET_BLOCK_HEADERS: u64 = BASE_PROTOCOL_LENGTH + 3;
    pub const BLOCK_HEADERS: u64 = BASE_PROTOCOL_LENGTH + 4;
    pub const GET_BLOCK_BODIES: u64 = BASE_PROTOCOL_LENGTH + 5;
    pub const BLOCK_BODIES: u64 = BASE_PROTOCOL_LENGTH + 6;
    pub const NEW_BLOCK: u64 = BASE_PROTOCOL_LENGTH + 7;
    pub const NEW_POOLED_TRANSACTION_HASHES: u64 = BASE_PROTOCOL_LENGTH + 8;
    pub const GET_POOLED_TRANSACTIONS: u64 = BASE_PROTOCOL_LENGTH + 9;
    pub const POOLED_TRANSACTIONS: u64 = BASE_PROTOCOL_LENGTH + 10;
}

/// A read or decode failure, surfaced where a message was expected.
#[derive(Debug, Error)]
pub enum LocalError {
    #[error("could not read from connection: {0}")]
    Read(#[source] std::io::Error),
    #[error("read deadline exceeded")]
    DeadlineExceeded,
    #[error("invalid message code: {0}")]
    UnknownCode(u64),
    #[error("could not decode message (code {code}): {reason}")]
    Malformed { code: u64, reason: String },
}

impl LocalError {
    pub const CODE: i64 = -1;

    /// Catalog code of a local error; never sent on the wire.
    pub fn code(&self) -> i64 {
        Self::CODE
    }
}

/// (name, version) pair advertised in Hello.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub version: u32,
}

impl Capability {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self { name: name.into(), version }
    }

    pub fn eth(version: u32) -> Self {
        Self::new("eth", version)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Base-protocol handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hello {
    pub version: u64,
    pub name: String,
    pub caps: Vec<Capability>,
    pub listen_port: u64,
    /// public identity of the sender
    pub id: Vec<u8>,
}

/// devp2p disconnect reasons. Unrecognized codes are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum DisconnectReason {
    Requested,
    NetworkError,
    ProtocolError,
    UselessPeer,
    TooManyPeers,
    AlreadyConnected,
    IncompatibleVersion,
    InvalidIdentity,
    QuitRequested,
    UnexpectedIdentity,
    SelfConnect,
    ReadTimeout,
    SubprotocolError,
    Other(u8),
}

impl From<u8> for DisconnectReason {
    fn from(code: u8) -> Self {
        match code {
            0x00 => DisconnectReason::Requested,
            0x01 => DisconnectReason::NetworkError,
            0x02 => DisconnectReason::ProtocolError,
            0x03 => DisconnectReason::UselessPeer,
            0x04 => DisconnectReason::TooManyPeers,
            0x05 => DisconnectReason::AlreadyConnected,
            0x06 => DisconnectReason::IncompatibleVersion,
            0x07 => DisconnectReason::InvalidIdentity,
            0x08 => DisconnectReason::QuitRequested,
            0x09 => DisconnectReason::UnexpectedIdentity,
            0x0a => DisconnectReason::SelfConnect,
            0x0b => DisconnectReason::ReadTimeout,
            0x10 => DisconnectReason::SubprotocolError,
            other => DisconnectReason::Other(other),
        }
    }
}

impl From<DisconnectReason> for u8 {
    fn from(reason: DisconnectReason) -> u8 {
        match reason {
            DisconnectReason::Requested => 0x00,
            DisconnectReason::NetworkError => 0x01,
            DisconnectReason::ProtocolError => 0x02,
            DisconnectReason::UselessPeer => 0x03,
            DisconnectReason::TooManyPeers => 0x04,
            DisconnectReason::AlreadyConnected => 0x05,
            DisconnectReason::IncompatibleVersion => 0x06,
            DisconnectReason::InvalidIdentity => 0x07,
            DisconnectReason::QuitRequested => 0x08,
            DisconnectReason::UnexpectedIdentity => 0x09,
            DisconnectReason::SelfConnect => 0x0a,
            DisconnectReason::ReadTimeout => 0x0b,
            DisconnectReason::SubprotocolError => 0x10,
            DisconnectReason::Other(code) => code,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::Requested => "disconnect requested",
            DisconnectReason::NetworkError => "network error",
            DisconnectReason::ProtocolError => "breach of protocol",
            DisconnectReason::UselessPeer => "useless peer",
            DisconnectReason::TooManyPeers => "too many peers",
            DisconnectReason::AlreadyConnected => "already connected",
            DisconnectReason::IncompatibleVersion => "incompatible p2p protocol version",
            DisconnectReason::InvalidIdentity => "invalid node identity",
            DisconnectReason::QuitRequested => "client quitting",
            DisconnectReason::UnexpectedIdentity => "unexpected identity",
            DisconnectReason::SelfConnect => "connected to self",
            DisconnectReason::ReadTimeout => "read timeout",
            DisconnectReason::SubprotocolError => "subprotocol error",
            DisconnectReason::Other(code) => return write!(f, "unknown disconnect reason {code}"),
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnect {
    pub reason: DisconnectReason,
}

/// eth status, exchanged once right after Hello.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub protocol_version: u32,
    pub network_id: u64,
    pub td: u128,
    pub head: H256,
    pub genesis: H256,
    pub fork_id: ForkId,
}

/// Header query by origin, count, gap and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetBlockHeaders {
    pub origin: HashOrNumber,
    pub amount: u64,
    pub skip: u64,
    pub reverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHashAnnouncement {
    pub hash: H256,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlock {
    pub block: Block,
    pub td: u128,
}

/// eth/66 request-id wrapper.
#[derive(Serialize)]
struct CorrelatedRef<'a, T> {
    request_id: u64,
    packet: &'a T,
}

#[derive(Deserialize)]
struct Correlated<T> {
    request_id: u64,
    packet: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello(Hello),
    Disconnect(Disconnect),
    Ping,
    Pong,
    Status(Status),
    NewBlockHashes(Vec<BlockHashAnnouncement>),
    Transactions(Vec<Transaction>),
    GetBlockHeaders(GetBlockHeaders),
    BlockHeaders(Vec<BlockHeader>),
    GetBlockBodies(Vec<H256>),
    BlockBodies(Vec<BlockBody>),
    NewBlock(Box<NewBlock>),
    NewPooledTransactionHashes(Vec<H256>),
    GetPooledTransactions(Vec<H256>),
    PooledTransactions(Vec<Transaction>),
}

impl Message {
    pub fn code(&self) -> u64 {
        match self {
            Message::Hello(_) => codes::HELLO,
            Message::Disconnect(_) => codes::DISCONNECT,
            Message::Ping => codes::PING,
            Message::Pong => codes::PONG,
            Message::Status(_) => codes::STATUS,
            Message::NewBlockHashes(_) => codes::NEW_BLOCK_HASHES,
            Message::Transactions(_) => codes::TRANSACTIONS,
            Message::GetBlockHeaders(_) => codes::GET_BLOCK_HEADERS,
            Message::BlockHeaders(_) => codes::BLOCK_HEADERS,
            Message::GetBlockBodies(_) => codes::GET_BLOCK_BODIES,
            Message::BlockBodies(_) => codes::BLOCK_BODIES,
            Message::NewBlock(_) => codes::NEW_BLOCK,
            Message::NewPooledTransactionHashes(_) => codes::NEW_POOLED_TRANSACTION_HASHES,
            Message::GetPooledTransactions(_) => codes::GET_POOLED_TRANSACTIONS,
            Message::PooledTransactions(_) => codes::POOLED_TRANSACTIONS,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::Hello(_) => "Hello",
            Message::Disconnect(_) => "Disconnect",
            Message::Ping => "Ping",
            Message::Pong => "Pong",
            Message::Status(_) => "Status",
            Message::NewBlockHashes(_) => "NewBlockHashes",
            Message::Transactions(_) => "Transactions",
            Message::GetBlockHeaders(_) => "GetBlockHeaders",
            Message::BlockHeaders(_) => "BlockHeaders",
            Message::GetBlockBodies(_) => "GetBlockBodies",
            Message::BlockBodies(_) => "BlockBodies",
            Message::NewBlock(_) => "NewBlock",
            Message::NewPooledTransactionHashes(_) => "NewPooledTransactionHashes",
            Message::GetPooledTransactions(_) => "GetPooledTransactions",
            Message::PooledTransactions(_) => "PooledTransactions",
        }
    }

    /// Whether this type carries a request id in the eth/66 generation.
    pub fn is_correlated(&self) -> bool {
        matches!(
            self,
            Message::GetBlockHeaders(_)
                | Message::BlockHeaders(_)
                | Message::GetBlockBodies(_)
                | Message::BlockBodies(_)
                | Message::GetPooledTransactions(_)
                | Message::PooledTransactions(_)
        )
    }

    /// Plain payload encoding.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        match self {
            Message::Hello(m) => bincode::serialize(m),
            Message::Disconnect(m) => bincode::serialize(m),
            Message::Ping | Message::Pong => Ok(Vec::new()),
            Message::Status(m) => bincode::serialize(m),
            Message::NewBlockHashes(m) => bincode::serialize(m),
            Message::Transactions(m) => bincode::serialize(m),
            Message::GetBlockHeaders(m) => bincode::serialize(m),
            Message::BlockHeaders(m) => bincode::serialize(m),
            Message::GetBlockBodies(m) => bincode::serialize(m),
            Message::BlockBodies(m) => bincode::serialize(m),
            Message::NewBlock(m) => bincode::serialize(m.as_ref()),
            Message::NewPooledTransactionHashes(m) => bincode::serialize(m),
            Message::GetPooledTransactions(m) => bincode::serialize(m),
            Message::PooledTransactions(m) => bincode::serialize(m),
        }
    }

    /// eth/66 payload encoding: correlated types are wrapped with `request_id`, the
    /// rest encode exactly as [`Message::encode`].
    pub fn encode_correlated(&self, request_id: u64) -> Result<Vec<u8>, bincode::Error> {
        fn wrap<T: Serialize>(request_id: u64, packet: &T) -> Result<Vec<u8>, bincode::Error> {
            bincode::serialize(&CorrelatedRef { request_id, packet })
        }
        match self {
            Message::GetBlockHeaders(m) => wrap(request_id, m),
            Message::BlockHeaders(m) => wrap(request_id, m),
            Message::GetBlockBodies(m) => wrap(request_id, m),
            Message::BlockBodies(m) => wrap(request_id, m),
            Message::GetPooledTransactions(m) => wrap(request_id, m),
            Message::PooledTransactions(m) => wrap(request_id, m),
            other => other.encode(),
        }
    }

    /// Plain decode surface: `(code, payload) -> message`.
    pub fn decode(code: u64, payload: &[u8]) -> Result<Message, LocalError> {
        let msg = match code {
            codes::HELLO => Message::Hello(decode_payload(code, payload)?),
            codes::DISCONNECT => Message::Disconnect(decode_payload(code, payload)?),
            codes::PING => Message::Ping,
            codes::PONG => Message::Pong,
            codes::STATUS => Message::Status(decode_payload(code, payload)?),
            codes::NEW_BLOCK_HASHES => Message::NewBlockHashes(decode_payload(code, payload)?),
            codes::TRANSACTIONS => Message::Transactions(decode_payload(code, payload)?),
            codes::GET_BLOCK_HEADERS => Message::GetBlockHeaders(decode_payload(code, payload)?),
            codes::BLOCK_HEADERS => Message::BlockHeaders(decode_payload(code, payload)?),
            codes::GET_BLOCK_BODIES => Message::GetBlockBodies(decode_payload(code, payload)?),
            codes::BLOCK_BODIES => Message::BlockBodies(decode_payload(code, payload)?),
            codes::NEW_BLOCK => Message::NewBlock(Box::new(decode_payload(code, payload)?)),
            codes::NEW_POOLED_TRANSACTION_HASHES => {
                Message::NewPooledTransactionHashes(decode_payload(code, payload)?)
            }
            codes::GET_POOLED_TRANSACTIONS => {
                Message::GetPooledTransactions(decode_payload(code, payload)?)
            }
            codes::POOLED_TRANSACTIONS => Message::PooledTransactions(decode_payload(code, payload)?),
            unknown => return Err(LocalError::UnknownCode(unknown)),
        };
        Ok(msg)
    }

    /// Correlated decode surface: `(code, payload) -> (request_id, message)`.
    /// Types without an id wrapper decode through [`Message::decode`] with id 0.
    pub fn decode_correlated(code: u64, payload: &[u8]) -> Result<(u64, Message), LocalError> {
        fn unwrap_id<T: DeserializeOwned>(
            code: u64,
            payload: &[u8],
            variant: fn(T) -> Message,
        ) -> Result<(u64, Message), LocalError> {
            let c: Correlated<T> = decode_payload(code, payload)?;
            Ok((c.request_id, variant(c.packet)))
        }
        match code {
            codes::GET_BLOCK_HEADERS => unwrap_id(code, payload, Message::GetBlockHeaders),
            codes::BLOCK_HEADERS => unwrap_id(code, payload, Message::BlockHeaders),
            codes::GET_BLOCK_BODIES => unwrap_id(code, payload, Message::GetBlockBodies),
            codes::BLOCK_BODIES => unwrap_id(code, payload, Message::BlockBodies),
            codes::GET_POOLED_TRANSACTIONS => unwrap_id(code, payload, Message::GetPooledTransactions),
            codes::POOLED_TRANSACTIONS => unwrap_id(code, payload, Message::PooledTransactions),
            _ => Message::decode(code, payload).map(|msg| (0, msg)),
        }
    }
}

fn decode_payload<T: DeserializeOwned>(code: u64, payload: &[u8]) -> Result<T, LocalError> {
    bincode::deserialize(payload).map_err(|e| LocalError::Malformed {
        code,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{Address, ForkId};

    fn header(n: u64) -> BlockHeader {
        BlockHeader { number: n, difficulty: 17, extra_data: vec![n as u8], ..Default::default() }
    }

    fn tx() -> Transaction {
        Transaction { nonce: 3, gas_price: 1, gas: 21_000, to: Some(Address([7; 20])), value: 10, data: vec![0xca, 0xfe] }
    }

    fn catalog() -> Vec<Message> {
        vec![
            Message::Hello(Hello {
                version: 5,
                name: "geth/v1.10".into(),
                caps: vec![Capability::eth(65), Capability::eth(66), Capability::new("snap", 1)],
                listen_port: 30303,
                id: vec![1; 32],
            }),
            Message::Disconnect(Disconnect { reason: DisconnectReason::TooManyPeers }),
            Message::Ping,
            Message::Pong,
            Message::Status(Status {
                protocol_version: 66,
                network_id: 250,
                td: u128::from(u64::MAX) + 5,
                head: H256([2; 32]),
                genesis: H256([3; 32]),
                fork_id: ForkId { hash: [0xde, 0xad, 0xbe, 0xef], next: 1_000 },
            }),
            Message::NewBlockHashes(vec![BlockHashAnnouncement { hash: H256([4; 32]), number: 9 }]),
            Message::Transactions(vec![tx()]),
            Message::GetBlockHeaders(GetBlockHeaders {
                origin: HashOrNumber::Hash(H256([5; 32])),
                amount: 2,
                skip: 1,
                reverse: false,
            }),
            Message::BlockHeaders(vec![header(1), header(3)]),
            Message::GetBlockBodies(vec![H256([6; 32])]),
            Message::BlockBodies(vec![BlockBody { transactions: vec![tx()], uncles: vec![header(0)] }]),
            Message::NewBlock(Box::new(NewBlock {
                block: Block { header: header(10), body: BlockBody::default() },
                td: 12_345,
            })),
            Message::NewPooledTransactionHashes(vec![tx().hash()]),
            Message::GetPooledTransactions(vec![tx().hash()]),
            Message::PooledTransactions(vec![tx()]),
        ]
    }

    #[test]
    fn every_variant_round_trips_on_both_surfaces() {
        for msg in catalog() {
            let plain = msg.encode().unwrap();
            assert_eq!(Message::decode(msg.code(), &plain).unwrap(), msg, "plain {}", msg.name());

            let wrapped = msg.encode_correlated(42).unwrap();
            let (id, decoded) = Message::decode_correlated(msg.code(), &wrapped).unwrap();
            assert_eq!(decoded, msg, "correlated {}", msg.name());
            let expected_id = if msg.is_correlated() { 42 } else { 0 };
            assert_eq!(id, expected_id, "request id of {}", msg.name());
        }
    }

    #[test]
    fn codes_match_the_wire_table() {
        let codes: Vec<u64> = catalog().iter().map(Message::code).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26]);
    }

    #[test]
    fn unknown_code_is_a_local_error() {
        for code in [4u64, 15, 27, 0xff, u64::MAX] {
            let err = Message::decode(code, &[]).unwrap_err();
            assert!(matches!(err, LocalError::UnknownCode(c) if c == code));
            assert_eq!(err.code(), -1);
            assert!(matches!(Message::decode_correlated(code, &[1, 2]), Err(LocalError::UnknownCode(_))));
        }
    }

    #[test]
    fn malformed_payload_is_a_local_error() {
        let err = Message::decode(codes::STATUS, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, LocalError::Malformed { code: codes::STATUS, .. }));
        assert_eq!(err.code(), LocalError::CODE);

        // a legacy-encoded header request lacks the id wrapper
        let legacy = Message::GetBlockHeaders(GetBlockHeaders::default()).encode().unwrap();
        assert!(Message::decode_correlated(codes::GET_BLOCK_HEADERS, &legacy).is_err());
    }

    #[test]
    fn disconnect_reason_uses_devp2p_codes() {
        let bytes = bincode::serialize(&Disconnect { reason: DisconnectReason::SubprotocolError }).unwrap();
        assert_eq!(bytes, vec![0x10]);
        let odd: Disconnect = bincode::deserialize(&[0x42]).unwrap();
        assert_eq!(odd.reason, DisconnectReason::Other(0x42));
        assert_eq!(odd.reason.to_string(), "unknown disconnect reason 66");
    }
}
