use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::crypto::Seed;
use crate::{Error, Prng};

const COMMITMENT_LABEL: &[u8] = b"Concord-Commitment";
const NONCE_LEN: usize = 32;

/// Length of a decommitment: the committed seed followed by the nonce.
pub const DECOMMITMENT_LEN: usize = 32 + NONCE_LEN;

/// Commits to `seed` under `context`.
///
/// Returns `(commitment, decommitment)`. The commitment hashes the context, the seed and a
/// fresh 32-byte nonce, so it reveals nothing about the seed.
pub fn commit(context: &[u8], seed: &Seed, prng: &Prng) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let nonce: [u8; NONCE_LEN] = prng.random_array()?;

    let mut decommitment = Vec::with_capacity(DECOMMITMENT_LEN);
    decommitment.extend_from_slice(seed.as_bytes());
    decommitment.extend_from_slice(&nonce);

    Ok((digest(context, &decommitment), decommitment))
}

/// Opens `commitment` and returns the committed seed, or [`Error::Commitment`] if the
/// decommitment does not match.
pub fn open(context: &[u8], commitment: &[u8], decommitment: &[u8]) -> Result<Seed, Error> {
    if decommitment.len() != DECOMMITMENT_LEN {
        return Err(Error::Commitment);
    }

    let expected = digest(context, decommitment);
    if !bool::from(expected.as_slice().ct_eq(commitment)) {
        return Err(Error::Commitment);
    }

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&decommitment[0..32]);
    Ok(Seed::from(seed))
}

fn digest(context: &[u8], decommitment: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(COMMITMENT_LABEL);
    hasher.update((context.len() as u32).to_be_bytes());
    hasher.update(context);
    hasher.update(decommitment);
    hasher.finalize().to_vec()
}
