//! Crypto module: node identity keys and ed25519 signatures used by the secure
//! channel's identity handshake.

pub mod keys;
pub mod sign;

pub use keys::{Keypair, NodeId};
pub use sign::{Signature, Signer, Verifier};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
    #[error("invalid signature bytes")]
    InvalidSignature,
    #[error("signature verification failed")]
    VerificationFailed,
}
