//! Helpers shared by unit and integration tests: a scripted in-memory channel and a
//! small reference chain.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::chain::types::ForkId;
use crate::chain::{Chain, ChainOracle};
use crate::config::ClientConfig;
use crate::crypto::Keypair;
use crate::network::codec::Frame;
use crate::network::connection::Connection;
use crate::network::message::{Capability, Hello, Message, Status};
use crate::network::transport::SecureChannel;

pub const TEST_NETWORK_ID: u64 = 1337;
pub const TEST_FORK_ID: ForkId = ForkId { hash: [0xfc, 0x64, 0xec, 0x04], next: 1_150_000 };

#[derive(Debug, Default)]
struct Recorded {
    written: Vec<Frame>,
    compressed: bool,
    closes: usize,
}

/// Inspection handle for what a [`ScriptedChannel`] saw.
#[derive(Debug, Clone, Default)]
pub struct ChannelLog(Arc<Mutex<Recorded>>);

impl ChannelLog {
    pub fn written(&self) -> Vec<Frame> {
        self.0.lock().unwrap().written.clone()
    }

    pub fn written_messages(&self) -> Vec<Message> {
        self.written()
            .iter()
            .map(|f| Message::decode(f.code, &f.payload).unwrap())
            .collect()
    }

    pub fn written_correlated(&self) -> Vec<(u64, Message)> {
        self.written()
            .iter()
            .map(|f| Message::decode_correlated(f.code, &f.payload).unwrap())
            .collect()
    }

    pub fn compressed(&self) -> bool {
        self.0.lock().unwrap().compressed
    }

    pub fn close_count(&self) -> usize {
        self.0.lock().unwrap().closes
    }
}

/// Plays back a fixed list of inbound frames, then stays silent forever.
pub struct ScriptedChannel {
    inbound: VecDeque<Frame>,
    log: ChannelLog,
}

impl ScriptedChannel {
    pub fn new(inbound: Vec<Frame>) -> (Self, ChannelLog) {
        let log = ChannelLog::default();
        (Self { inbound: inbound.into(), log: log.clone() }, log)
    }
}

#[async_trait]
impl SecureChannel for ScriptedChannel {
    async fn read_frame(&mut self) -> io::Result<Frame> {
        match self.inbound.pop_front() {
            Some(frame) => Ok(frame),
            None => futures::future::pending().await,
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> io::Result<usize> {
        let n = frame.body_len();
        self.log.0.lock().unwrap().written.push(frame);
        Ok(n)
    }

    fn set_compressed(&mut self, enabled: bool) {
        self.log.0.lock().unwrap().compressed = enabled;
    }

    async fn close(&mut self) -> io::Result<()> {
        self.log.0.lock().unwrap().closes += 1;
        Ok(())
    }
}

pub fn frame(msg: &Message) -> Frame {
    Frame::new(msg.code(), Bytes::from(msg.encode().unwrap()))
}

pub fn correlated_frame(request_id: u64, msg: &Message) -> Frame {
    Frame::new(msg.code(), Bytes::from(msg.encode_correlated(request_id).unwrap()))
}

pub fn test_connection(inbound: Vec<Frame>, config: ClientConfig) -> (Connection<ScriptedChannel>, ChannelLog) {
    let (channel, log) = ScriptedChannel::new(inbound);
    (Connection::new(channel, Keypair::generate().unwrap(), config), log)
}

pub fn test_chain() -> Chain {
    Chain::synthetic(TEST_NETWORK_ID, TEST_FORK_ID, 16).unwrap()
}

pub fn peer_hello(version: u64, eth_versions: &[u32]) -> Hello {
    Hello {
        version,
        name: "fake-node".into(),
        caps: eth_versions.iter().map(|v| Capability::eth(*v)).collect(),
        listen_port: 30303,
        id: Keypair::generate().unwrap().node_id().as_bytes().to_vec(),
    }
}

/// Status a well-behaved peer following `chain` would send.
pub fn peer_status(chain: &Chain, protocol_version: u32) -> Status {
    Status {
        protocol_version,
        network_id: chain.network_id(),
        td: chain.total_difficulty(),
        head: chain.head_hash(),
        genesis: chain.genesis_hash(),
        fork_id: chain.fork_id(),
    }
}
