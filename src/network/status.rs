use tracing::{debug, info};

use crate::chain::ChainOracle;
use crate::network::connection::Connection;
use crate::network::message::{Message, Status};
use crate::network::transport::SecureChannel;
use crate::utils::{ConformanceError, Result, StatusField};

fn mismatch(field: StatusField, expected: impl ToString, actual: impl ToString) -> ConformanceError {
    ConformanceError::ValidationFailure {
        field,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// Check a peer's Status against the reference chain. Fields are checked in a
/// fixed order and the first mismatch is reported.
pub fn validate_status(peer: &Status, chain: &dyn ChainOracle, expected_version: u32) -> Result<()> {
    let head = chain.head_hash();
    if peer.head != head {
        return Err(mismatch(StatusField::HeadHash, head, peer.head));
    }
    let td = chain.total_difficulty();
    if peer.td != td {
        return Err(mismatch(StatusField::TotalDifficulty, td, peer.td));
    }
    let fork_id = chain.fork_id();
    if peer.fork_id != fork_id {
        return Err(mismatch(StatusField::ForkId, fork_id, peer.fork_id));
    }
    if peer.protocol_version != expected_version {
        return Err(mismatch(StatusField::ProtocolVersion, expected_version, peer.protocol_version));
    }
    Ok(())
}

impl<C: SecureChannel> Connection<C> {
    /// Wait for the peer's Status, validate it, then send ours. `status` overrides
    /// the Status we would otherwise build from the chain. Returns the peer's Status.
    pub async fn status_exchange(&mut self, chain: &dyn ChainOracle, status: Option<Status>) -> Result<Status> {
        let timeout = self.config().status_timeout();
        let mut conn = self.with_deadline(timeout);

        let peer = loop {
            match conn.read().await? {
                Message::Status(peer) => {
                    validate_status(&peer, chain, conn.our_highest_protocol())?;
                    break peer;
                }
                Message::Ping => {
                    debug!("ping during status exchange");
                    conn.write(&Message::Pong).await?;
                }
                Message::Disconnect(msg) => {
                    return Err(ConformanceError::ProtocolViolation(format!(
                        "disconnect received: {}",
                        msg.reason
                    )));
                }
                other => {
                    return Err(ConformanceError::ProtocolViolation(format!(
                        "bad status message: {other:?}"
                    )));
                }
            }
        };

        let version = conn.negotiated_version();
        if version == 0 {
            return Err(ConformanceError::NegotiationFailure(
                "eth protocol version must be negotiated before sending status".into(),
            ));
        }
        let ours = status.unwrap_or_else(|| Status {
            protocol_version: version,
            network_id: chain.network_id(),
            td: chain.total_difficulty(),
            head: chain.head_hash(),
            genesis: chain.genesis_hash(),
            fork_id: chain.fork_id(),
        });
        conn.write(&Message::Status(ours)).await?;
        info!("status exchanged, peer head {}", peer.head);
        Ok(peer)
    }

    /// [`Connection::handshake`] followed by [`Connection::status_exchange`].
    pub async fn perform_handshake_and_status(
        &mut self,
        chain: &dyn ChainOracle,
        status: Option<Status>,
    ) -> Result<Status> {
        self.handshake()
            .await
            .map_err(|e| ConformanceError::Handshake(Box::new(e)))?;
        self.status_exchange(chain, status)
            .await
            .map_err(|e| ConformanceError::StatusExchange(Box::new(e)))
    }
}
