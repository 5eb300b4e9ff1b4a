use ed25519_dalek::{Keypair as DalekKeypair, PublicKey as DalekPublic, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

use crate::crypto::CryptoError;

/// Public identity of a node (ed25519 public key bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        // reject points that are not valid keys up front
        DalekPublic::from_bytes(&raw).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(NodeId(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn to_dalek(self) -> Result<DalekPublic, CryptoError> {
        DalekPublic::from_bytes(&self.0).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = hex::encode(self.0);
        write!(f, "{}..{}", &full[..8], &full[full.len() - 8..])
    }
}

/// Local node key pair. A fresh one is generated for every dial.
pub struct Keypair {
    pub(crate) keypair: DalekKeypair,
}

impl Keypair {
    /// Generate a new random keypair from OS randomness.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::from_bytes(&secret)
    }

    /// Construct from raw secret bytes
    pub fn from_bytes(secret: &[u8]) -> Result<Self, CryptoError> {
        let sk = SecretKey::from_bytes(secret).map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?;
        let pk = DalekPublic::from(&sk);
        Ok(Self { keypair: DalekKeypair { secret: sk, public: pk } })
    }

    /// Public identity advertised in Hello and checked by the secure handshake
    pub fn node_id(&self) -> NodeId {
        NodeId(self.keypair.public.to_bytes())
    }

    /// Export secret as bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.keypair.secret.to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("node_id", &self.node_id()).finish_non_exhaustive()
    }
}
