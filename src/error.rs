use crate::codec::DecodeError;

/// Errors that can occur while running handshake protocols.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// A cryptographic operation failed.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// A signature could not be parsed or did not verify.
    #[error("Signature verification failed")]
    Signature,

    /// A commitment could not be opened with the given decommitment.
    #[error("Commitment could not be opened")]
    Commitment,

    /// Random number generation failed.
    #[error("Random number generation failed")]
    Random,

    /// A collaborator store failed. The step may be retried.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encoded state or message data is corrupt.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Snapshot serialization or deserialization failed.
    #[error("Serialization/deserialization failed: {0}")]
    Serde(String),

    /// The engine configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An inbound message names a protocol this engine does not run.
    #[error("Unknown protocol id {0}")]
    UnknownProtocol(u64),
}

impl Error {
    /// Transient errors leave the instance in its pre-step state so the message can be
    /// redelivered later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Crypto(_) | Self::Random | Self::Storage(_))
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(_: ed25519_dalek::SignatureError) -> Self {
        Self::Signature
    }
}

impl From<hkdf::InvalidLength> for Error {
    fn from(value: hkdf::InvalidLength) -> Self {
        Self::Crypto(value.to_string())
    }
}
