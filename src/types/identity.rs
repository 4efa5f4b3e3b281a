use std::fmt;

use base64::Engine;
use ed25519_dalek::VerifyingKey;

use crate::codec::{Decode, DecodeError, Encode, Encoded};
use crate::crypto::{SignatureContext, verify_signature};
use crate::{Error, X25519PublicKey};

/// Public half of a cryptographic identity.
///
/// The 64 bytes are the Ed25519 verifying key followed by the X25519 public key. Identities are
/// compared byte-wise, which gives the total order used to break symmetry between peers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; 64]);

impl Identity {
    pub(crate) fn new(signing_key: &VerifyingKey, dh_key: &X25519PublicKey) -> Self {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(signing_key.as_bytes());
        bytes[32..64].copy_from_slice(dh_key.as_bytes());
        Self(bytes)
    }

    /// Parses an identity, checking that the signing key is a valid curve point.
    pub fn from_bytes(bytes: [u8; 64]) -> Result<Self, Error> {
        let identity = Self(bytes);
        identity.signing_key()?;
        Ok(identity)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Returns the Ed25519 verifying key.
    pub fn signing_key(&self) -> Result<VerifyingKey, Error> {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.0[0..32]);
        Ok(VerifyingKey::from_bytes(&key)?)
    }

    /// Returns the X25519 public key.
    pub fn dh_key(&self) -> X25519PublicKey {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.0[32..64]);
        X25519PublicKey::from(key)
    }

    /// Verifies a signature produced by the matching [`IdentityKey`](crate::IdentityKey) over
    /// the same context and fields.
    pub fn verify(
        &self,
        context: SignatureContext,
        fields: &[&[u8]],
        signature: &[u8],
    ) -> Result<(), Error> {
        verify_signature(&self.signing_key()?, context, fields, signature)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        f.write_str(&engine.encode(&self.0[..12]))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

impl Encode for Identity {
    fn encode(&self) -> Encoded {
        Encoded::Identity(self.0)
    }
}

impl Decode for Identity {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        match encoded {
            Encoded::Identity(bytes) => Ok(Self(*bytes)),
            other => Err(other.type_error("identity")),
        }
    }
}
