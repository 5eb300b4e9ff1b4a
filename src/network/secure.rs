//! Identity handshake run on a fresh stream before any protocol message.
//!
//! Both sides prove possession of their ed25519 key by signing a transcript that
//! covers both identities and both nonces:
//!
//! ```text
//! initiator -> Auth    { node_id, nonce }
//! responder -> AuthAck { node_id, nonce, signature(responder transcript) }
//! initiator -> AuthFin { signature(initiator transcript) }
//! ```
//!
//! The initiator also checks that the responder is the node it meant to dial.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::crypto::{Keypair, NodeId, Signature, Signer, Verifier};
use crate::network::codec::{Frame, FrameCodec};
use crate::utils::{ConformanceError, Result};

/// Secure handshake version; both sides must agree.
pub const SECURE_VERSION: u16 = 1;

// Frame codes reserved for the secure handshake, outside the message catalog.
const AUTH: u64 = 0xffff_0001;
const AUTH_ACK: u64 = 0xffff_0002;
const AUTH_FIN: u64 = 0xffff_0003;

const DOMAIN: &[u8] = b"eth-conformance/secure-handshake";

#[derive(Debug, Serialize, Deserialize)]
struct Auth {
    version: u16,
    node_id: [u8; 32],
    nonce: [u8; 16],
}

#[derive(Debug, Serialize, Deserialize)]
struct AuthAck {
    version: u16,
    node_id: [u8; 32],
    nonce: [u8; 16],
    signature: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AuthFin {
    signature: Vec<u8>,
}

#[derive(Clone, Copy)]
enum Role {
    Initiator = 1,
    Responder = 2,
}

struct Transcript<'a> {
    initiator: &'a [u8; 32],
    initiator_nonce: &'a [u8; 16],
    responder: &'a [u8; 32],
    responder_nonce: &'a [u8; 16],
}

impl Transcript<'_> {
    /// bytes signed by `role`: domain || role || version || ids and nonces
    fn bytes(&self, role: Role) -> Vec<u8> {
        let mut out = Vec::with_capacity(DOMAIN.len() + 3 + 2 * (32 + 16));
        out.extend_from_slice(DOMAIN);
        out.push(role as u8);
        out.extend_from_slice(&SECURE_VERSION.to_be_bytes());
        out.extend_from_slice(self.initiator);
        out.extend_from_slice(self.initiator_nonce);
        out.extend_from_slice(self.responder);
        out.extend_from_slice(self.responder_nonce);
        out
    }
}

fn nonce() -> [u8; 16] {
    let mut nonce = [0u8; 16];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn handshake_err(msg: impl Into<String>) -> ConformanceError {
    ConformanceError::SecureHandshake(msg.into())
}

async fn send<S, T>(framed: &mut Framed<S, FrameCodec>, code: u64, msg: &T) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(msg).map_err(|e| handshake_err(e.to_string()))?;
    framed.send(Frame::new(code, Bytes::from(payload))).await?;
    Ok(())
}

async fn recv<S, T>(framed: &mut Framed<S, FrameCodec>, code: u64) -> Result<T>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: DeserializeOwned,
{
    let frame = match framed.next().await {
        Some(frame) => frame?,
        None => return Err(handshake_err("connection closed during handshake")),
    };
    if frame.code != code {
        return Err(handshake_err(format!(
            "unexpected frame code {:#x}, want {code:#x}",
            frame.code
        )));
    }
    bincode::deserialize(&frame.payload).map_err(|e| handshake_err(format!("bad handshake frame: {e}")))
}

fn check_version(version: u16) -> Result<()> {
    if version != SECURE_VERSION {
        return Err(handshake_err(format!(
            "unsupported secure handshake version {version}, want {SECURE_VERSION}"
        )));
    }
    Ok(())
}

fn verify(id: &NodeId, msg: &[u8], signature: &[u8]) -> Result<()> {
    let sig = Signature::from_slice(signature).map_err(|e| handshake_err(e.to_string()))?;
    id.verify(msg, &sig).map_err(|e| handshake_err(format!("peer {id}: {e}")))
}

/// Dialing side. Fails unless the peer proves it owns `remote`.
pub async fn initiate<S>(framed: &mut Framed<S, FrameCodec>, local: &Keypair, remote: &NodeId) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let local_id = local.node_id();
    let my_nonce = nonce();
    send(framed, AUTH, &Auth { version: SECURE_VERSION, node_id: local_id.0, nonce: my_nonce }).await?;

    let ack: AuthAck = recv(framed, AUTH_ACK).await?;
    check_version(ack.version)?;
    if ack.node_id != remote.0 {
        return Err(handshake_err(format!(
            "remote identity mismatch: dialed {remote}, answered by {}",
            hex::encode(ack.node_id)
        )));
    }
    let transcript = Transcript {
        initiator: &local_id.0,
        initiator_nonce: &my_nonce,
        responder: &ack.node_id,
        responder_nonce: &ack.nonce,
    };
    verify(remote, &transcript.bytes(Role::Responder), &ack.signature)?;

    let signature = local.sign(&transcript.bytes(Role::Initiator)).0.to_vec();
    send(framed, AUTH_FIN, &AuthFin { signature }).await?;
    debug!("secure handshake with {remote} complete");
    Ok(())
}

/// Listening side. Returns the authenticated identity of the dialer.
pub async fn accept<S>(framed: &mut Framed<S, FrameCodec>, local: &Keypair) -> Result<NodeId>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let auth: Auth = recv(framed, AUTH).await?;
    check_version(auth.version)?;
    let remote = NodeId::from_slice(&auth.node_id).map_err(|e| handshake_err(e.to_string()))?;

    let local_id = local.node_id();
    let my_nonce = nonce();
    let transcript = Transcript {
        initiator: &auth.node_id,
        initiator_nonce: &auth.nonce,
        responder: &local_id.0,
        responder_nonce: &my_nonce,
    };
    let signature = local.sign(&transcript.bytes(Role::Responder)).0.to_vec();
    send(
        framed,
        AUTH_ACK,
        &AuthAck { version: SECURE_VERSION, node_id: local_id.0, nonce: my_nonce, signature },
    )
    .await?;

    let fin: AuthFin = recv(framed, AUTH_FIN).await?;
    verify(&remote, &transcript.bytes(Role::Initiator), &fin.signature)?;
    debug!("accepted secure handshake from {remote}");
    Ok(remote)
}
