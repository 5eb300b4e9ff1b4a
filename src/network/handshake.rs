use tracing::{debug, info, warn};

use crate::network::connection::Connection;
use crate::network::message::{Capability, Hello, Message};
use crate::network::transport::SecureChannel;
use crate::utils::{ConformanceError, Result};

/// Peers at this base-protocol version or above switch to compressed mode.
pub const COMPRESSION_MIN_VERSION: u64 = 5;

/// Highest "eth" version the peer advertises that does not exceed `our_highest`.
/// 0 when there is none.
pub fn negotiate_eth_protocol(our_highest: u32, peer_caps: &[Capability]) -> u32 {
    peer_caps
        .iter()
        .filter(|cap| cap.name == "eth" && cap.version <= our_highest)
        .map(|cap| cap.version)
        .max()
        .unwrap_or(0)
}

impl<C: SecureChannel> Connection<C> {
    fn local_hello(&self) -> Hello {
        Hello {
            version: self.config().base_protocol_version,
            name: self.config().client_name.clone(),
            caps: self.caps().to_vec(),
            listen_port: self.config().listen_port,
            id: self.local_id().as_bytes().to_vec(),
        }
    }

    async fn send_hello_and_read(&mut self) -> Result<Message> {
        let hello = self.local_hello();
        debug!("sending hello with caps {:?}", hello.caps);
        self.write(&Message::Hello(hello)).await?;
        Ok(self.read().await?)
    }

    /// Send our Hello and return the first message the peer answers with,
    /// unvalidated. Bounded by the handshake timeout.
    pub async fn exchange_hello(&mut self) -> Result<Message> {
        let timeout = self.config().handshake_timeout();
        let mut conn = self.with_deadline(timeout);
        conn.send_hello_and_read().await
    }

    /// Exchange Hello messages and negotiate the eth version. Returns the peer's Hello.
    pub async fn handshake(&mut self) -> Result<Hello> {
        let timeout = self.config().handshake_timeout();
        let mut conn = self.with_deadline(timeout);

        let peer = match conn.send_hello_and_read().await? {
            Message::Hello(hello) => hello,
            other => {
                warn!("expected hello, got {}", other.name());
                return Err(ConformanceError::ProtocolViolation(format!("bad handshake: {other:?}")));
            }
        };

        if peer.version >= COMPRESSION_MIN_VERSION {
            conn.set_compressed(true);
        }

        let version = negotiate_eth_protocol(conn.our_highest_protocol(), &peer.caps);
        conn.set_negotiated_version(version);
        if version == 0 {
            return Err(ConformanceError::NegotiationFailure(format!(
                "no common eth version (ours up to {}, peer offers {:?})",
                conn.our_highest_protocol(),
                peer.caps
            )));
        }
        info!("negotiated eth/{version} with {}", peer.name);
        Ok(peer)
    }
}
