use ed25519_dalek::{Signature as DalekSig, Signer as DalekSigner, Verifier as DalekVerifier};

use crate::crypto::{CryptoError, Keypair, NodeId};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; 64] = bytes.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Signature(raw))
    }
}

/// Trait for signing
pub trait Signer {
    fn sign(&self, msg: &[u8]) -> Signature;
}

/// Trait for verifying
pub trait Verifier {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), CryptoError>;
}

impl Signer for Keypair {
    fn sign(&self, msg: &[u8]) -> Signature {
        let sig = self.keypair.sign(msg);
        Signature(sig.to_bytes())
    }
}

impl Verifier for NodeId {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), CryptoError> {
        let pk = self.to_dalek()?;
        let ds = DalekSig::try_from(&sig.0[..]).map_err(|_| CryptoError::InvalidSignature)?;
        pk.verify(msg, &ds).map_err(|_| CryptoError::VerificationFailed)
    }
}
