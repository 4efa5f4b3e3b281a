use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::{Decode, DecodeError, Encode, Encoded};
use crate::{Error, Prng};

/// A 32-byte symmetric secret: channel seeds, KEM outputs and SAS seeds.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 32]);

impl Seed {
    pub fn random(prng: &Prng) -> Result<Self, Error> {
        Ok(Self(prng.random_array()?))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derives a channel seed from the two KEM keys exchanged during channel creation.
    ///
    /// The order of `k1` and `k2` matters; both ends pass them in protocol order.
    pub fn combine(k1: &Seed, k2: &Seed, info: &[u8]) -> Result<Seed, Error> {
        let mut ikm = [0u8; 64];
        ikm[0..32].copy_from_slice(&k1.0);
        ikm[32..64].copy_from_slice(&k2.0);

        let hkdf = Hkdf::<Sha256>::new(Some(b"Concord-Channel-Seed"), &ikm);
        let mut okm = [0u8; 32];
        let result = hkdf.expand(info, &mut okm);
        ikm.zeroize();
        result?;

        Ok(Seed(okm))
    }
}

impl From<[u8; 32]> for Seed {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl PartialEq for Seed {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Seed {}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

impl Encode for Seed {
    fn encode(&self) -> Encoded {
        Encoded::Seed(self.0)
    }
}

impl Decode for Seed {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        match encoded {
            Encoded::Seed(bytes) => Ok(Self(*bytes)),
            other => Err(other.type_error("seed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_depends_on_order_and_info() {
        let k1 = Seed::from([1; 32]);
        let k2 = Seed::from([2; 32]);

        let seed = Seed::combine(&k1, &k2, b"info").unwrap();
        assert_eq!(seed, Seed::combine(&k1, &k2, b"info").unwrap());
        assert_ne!(seed, Seed::combine(&k2, &k1, b"info").unwrap());
        assert_ne!(seed, Seed::combine(&k1, &k2, b"other").unwrap());
    }

    #[test]
    fn test_debug_is_redacted() {
        let seed = Seed::from([9; 32]);
        assert_eq!(format!("{seed:?}"), "Seed(..)");
    }
}
