use std::fmt;

use thiserror::Error;

use crate::chain::ChainError;
use crate::crypto::CryptoError;
use crate::network::message::LocalError;

/// Status fields checked during the status exchange, in validation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    HeadHash,
    TotalDifficulty,
    ForkId,
    ProtocolVersion,
}

impl fmt::Display for StatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusField::HeadHash => "head block",
            StatusField::TotalDifficulty => "total difficulty",
            StatusField::ForkId => "fork ID",
            StatusField::ProtocolVersion => "protocol version",
        };
        f.write_str(name)
    }
}

/// Unified error type for the conformance client
#[derive(Error, Debug)]
pub enum ConformanceError {
    #[error("invalid node record: {0}")]
    InvalidNodeRecord(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("local identity: {0}")]
    Identity(#[from] CryptoError),

    #[error("secure handshake failed: {0}")]
    SecureHandshake(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("negotiation failure: {0}")]
    NegotiationFailure(String),

    #[error("wrong {field} in status: have {actual}, want {expected}")]
    ValidationFailure {
        field: StatusField,
        expected: String,
        actual: String,
    },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("chain oracle error: {0}")]
    Chain(#[from] ChainError),

    #[error("could not encode message: {0}")]
    Encode(String),

    #[error("handshake failed: {0}")]
    Handshake(#[source] Box<ConformanceError>),

    #[error("status exchange failed: {0}")]
    StatusExchange(#[source] Box<ConformanceError>),
}

impl ConformanceError {
    /// Field name of a status validation failure, if this is one (looks through the
    /// handshake / status-exchange wrappers).
    pub fn status_field(&self) -> Option<StatusField> {
        match self {
            ConformanceError::ValidationFailure { field, .. } => Some(*field),
            ConformanceError::Handshake(inner) | ConformanceError::StatusExchange(inner) => {
                inner.status_field()
            }
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ConformanceError::Timeout(_) => true,
            ConformanceError::Handshake(inner) | ConformanceError::StatusExchange(inner) => {
                inner.is_timeout()
            }
            _ => false,
        }
    }
}

impl From<LocalError> for ConformanceError {
    fn from(err: LocalError) -> Self {
        match err {
            LocalError::Read(io) => ConformanceError::Transport(io),
            LocalError::DeadlineExceeded => ConformanceError::Timeout(err.to_string()),
            LocalError::UnknownCode(_) | LocalError::Malformed { .. } => {
                ConformanceError::ProtocolViolation(err.to_string())
            }
        }
    }
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, ConformanceError>;
