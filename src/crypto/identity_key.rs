use ed25519_dalek::{SecretKey, SigningKey, VerifyingKey};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{Seed, SignatureContext, sign};
use crate::{Error, Identity, Prng, X25519PublicKey, X25519Secret};

const DETERMINISTIC_SEED_KEY_INFO: &[u8] = b"Concord-Deterministic-Seed-Key";

/// Purposes for which an identity derives a deterministic seed. Each purpose yields an
/// independent seed for the same input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedContext {
    /// The invitee's seed for the short authentication string.
    Sas,
}

impl SeedContext {
    fn label(self) -> &'static [u8] {
        match self {
            Self::Sas => b"Concord-Seed-SAS",
        }
    }
}

/// Private half of an owned identity: an Ed25519 signing key and an X25519 key, derived from
/// the same seed.
///
/// All devices of an identity hold the same `IdentityKey`, which is what lets sibling devices
/// recompute each other's deterministic seeds.
pub struct IdentityKey {
    signing_key: Box<SigningKey>,
    dh_key: X25519Secret,
}

impl IdentityKey {
    /// Creates a new identity key with randomly generated components.
    pub fn new(prng: &Prng) -> Result<Self, Error> {
        let mut seed = prng.random_array::<32>()?;
        let signing_key = Box::new(SigningKey::from(SecretKey::from(seed)));
        let dh_key = X25519Secret::from(seed);
        seed.zeroize();

        Ok(Self {
            signing_key,
            dh_key,
        })
    }

    /// Returns the public identity matching this key.
    pub fn identity(&self) -> Identity {
        Identity::new(&self.signing_key_public(), &self.dh_key_public())
    }

    /// Returns the public Ed25519 signing key for this identity.
    pub fn signing_key_public(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Returns the public X25519 key for this identity.
    pub fn dh_key_public(&self) -> X25519PublicKey {
        self.dh_key.public_key()
    }

    /// Produces a randomised signature over `fields` under `context`.
    pub fn sign(
        &self,
        context: SignatureContext,
        fields: &[&[u8]],
        prng: &Prng,
    ) -> Result<Vec<u8>, Error> {
        sign(&self.signing_key, context, fields, prng)
    }

    /// Derives a seed that only holders of this identity key can compute, and that every one
    /// of them computes identically for the same `context` and `input`.
    pub fn deterministic_seed(&self, context: SeedContext, input: &[u8]) -> Result<Seed, Error> {
        let hkdf = Hkdf::<Sha256>::new(None, self.signing_key.as_bytes());
        let mut key = [0u8; 32];
        hkdf.expand(DETERMINISTIC_SEED_KEY_INFO, &mut key)?;

        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&key)
            .map_err(|err| Error::Crypto(err.to_string()))?;
        key.zeroize();
        mac.update(context.label());
        mac.update(input);

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&mac.finalize().into_bytes());
        let seed = Seed::from(bytes);
        bytes.zeroize();

        Ok(seed)
    }

    /// Serializes the identity key to a 64-byte array.
    ///
    /// The first 32 bytes contain the Ed25519 private key,
    /// and the last 32 bytes contain the X25519 private key.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(self.signing_key.as_bytes().as_slice());
        bytes[32..64].copy_from_slice(self.dh_key.as_bytes());

        bytes
    }
}

impl From<[u8; 64]> for IdentityKey {
    /// Deserializes an identity key from a 64-byte array.
    fn from(bytes: [u8; 64]) -> Self {
        let mut private_sk_bytes = [0u8; 32];
        private_sk_bytes.copy_from_slice(&bytes[0..32]);
        let signing_key = Box::new(SigningKey::from_bytes(&private_sk_bytes));
        private_sk_bytes.zeroize();

        let mut private_dh_bytes = [0u8; 32];
        private_dh_bytes.copy_from_slice(&bytes[32..64]);
        let dh_key = X25519Secret::from(private_dh_bytes);
        private_dh_bytes.zeroize();

        Self {
            signing_key,
            dh_key,
        }
    }
}

impl Zeroize for IdentityKey {
    fn zeroize(&mut self) {
        self.dh_key.zeroize();
    }
}

impl ZeroizeOnDrop for IdentityKey {}
