use std::fmt;

use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::{Decode, DecodeError, Encode, Encoded};
use crate::{Error, Prng};

/// An X25519 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct X25519PublicKey(PublicKey);

impl X25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<[u8; 32]> for X25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(PublicKey::from(bytes))
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(value: PublicKey) -> Self {
        Self(value)
    }
}

impl AsRef<PublicKey> for X25519PublicKey {
    fn as_ref(&self) -> &PublicKey {
        &self.0
    }
}

impl Encode for X25519PublicKey {
    fn encode(&self) -> Encoded {
        Encoded::PublicKey(self.to_bytes())
    }
}

impl Decode for X25519PublicKey {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        match encoded {
            Encoded::PublicKey(bytes) => Ok(Self::from(*bytes)),
            other => Err(other.type_error("public key")),
        }
    }
}

/// An X25519 private key. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct X25519Secret(Box<StaticSecret>);

impl X25519Secret {
    /// Generates a fresh private key from the engine's PRNG.
    pub(crate) fn generate(prng: &Prng) -> Result<Self, Error> {
        let mut bytes = prng.random_array::<32>()?;
        let secret = Self::from(bytes);
        bytes.zeroize();
        Ok(secret)
    }

    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> SharedSecret {
        self.0.diffie_hellman(public_key.as_ref())
    }

    pub(crate) fn public_key(&self) -> X25519PublicKey {
        let pub_key = PublicKey::from(self.0.as_ref());
        pub_key.into()
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<[u8; 32]> for X25519Secret {
    fn from(bytes: [u8; 32]) -> Self {
        Self(Box::new(StaticSecret::from(bytes)))
    }
}

impl fmt::Debug for X25519Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("X25519Secret(..)")
    }
}

impl Encode for X25519Secret {
    fn encode(&self) -> Encoded {
        Encoded::PrivateKey(*self.as_bytes())
    }
}

impl Decode for X25519Secret {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        match encoded {
            Encoded::PrivateKey(bytes) => Ok(Self::from(*bytes)),
            other => Err(other.type_error("private key")),
        }
    }
}
