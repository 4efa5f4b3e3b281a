use std::fmt;

use base64::Engine;

use crate::codec::{Decode, DecodeError, Encode, Encoded};
use crate::{Error, Prng};

/// A fixed-length unique identifier, used for devices, protocol instances and dialogs.
///
/// UIDs are totally ordered by their bytes. Device UIDs take part in the tie-break that
/// elects which side of a symmetric exchange leads, so the order must never change.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid([u8; 32]);

impl Uid {
    /// Draws a fresh random UID.
    pub fn random(prng: &Prng) -> Result<Self, Error> {
        Ok(Self(prng.random_array()?))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Uid {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        f.write_str(&engine.encode(self.0))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        write!(f, "Uid({})", &engine.encode(&self.0[..6]))
    }
}

impl Encode for Uid {
    fn encode(&self) -> Encoded {
        Encoded::Uid(self.0)
    }
}

impl Decode for Uid {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        match encoded {
            Encoded::Uid(bytes) => Ok(Self(*bytes)),
            other => Err(other.type_error("uid")),
        }
    }
}

impl Encode for Vec<Uid> {
    fn encode(&self) -> Encoded {
        Encoded::List(self.iter().map(Encode::encode).collect())
    }
}

impl Decode for Vec<Uid> {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        encoded.as_list()?.iter().map(Uid::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_uids_differ() {
        let prng = Prng::from_seed([1; 32]);
        let a = Uid::random(&prng).unwrap();
        let b = Uid::random(&prng).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ordering_follows_bytes() {
        let mut low = [0u8; 32];
        let mut high = [0u8; 32];
        low[0] = 1;
        high[0] = 2;
        high[31] = 0;
        low[31] = 0xff;
        assert!(Uid::from(low) < Uid::from(high));
    }

    #[test]
    fn test_uid_list_rejects_foreign_atoms() {
        let encoded = Encoded::List(vec![Encoded::Uid([0; 32]), Encoded::Int(3)]);
        assert!(Vec::<Uid>::decode(&encoded).is_err());
    }
}
