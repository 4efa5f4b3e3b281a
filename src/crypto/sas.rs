use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::crypto::Seed;
use crate::{Error, Identity};

/// The two halves of a double-length short authentication string.
///
/// `own` is displayed locally; `contact` is what the user must type in after reading the
/// peer's screen. The peer computes the same pair with the halves swapped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SasPair {
    pub own: String,
    pub contact: String,
}

/// Computes the short authentication string shared by two identities.
///
/// Seeds are ordered by identity before mixing, and both identities are bound into the
/// derivation, so both peers compute the same digit string and substituting a third party's
/// commitment changes it.
pub fn compute_sas(
    own_identity: &Identity,
    own_seed: &Seed,
    contact_identity: &Identity,
    contact_seed: &Seed,
    digits: u32,
    info: &[u8],
) -> Result<SasPair, Error> {
    if !(1..=9).contains(&digits) {
        return Err(Error::Config(format!("unsupported SAS length {digits}")));
    }

    let own_first = own_identity <= contact_identity;
    let (first_identity, first_seed, second_identity, second_seed) = if own_first {
        (own_identity, own_seed, contact_identity, contact_seed)
    } else {
        (contact_identity, contact_seed, own_identity, own_seed)
    };

    let mut ikm = [0u8; 64];
    ikm[0..32].copy_from_slice(first_seed.as_bytes());
    ikm[32..64].copy_from_slice(second_seed.as_bytes());
    let hkdf = Hkdf::<Sha256>::new(Some(b"Concord-SAS"), &ikm);
    ikm.zeroize();

    let mut full_info = Vec::with_capacity(info.len() + 128);
    full_info.extend_from_slice(info);
    full_info.extend_from_slice(first_identity.as_bytes());
    full_info.extend_from_slice(second_identity.as_bytes());

    let mut okm = [0u8; 16];
    hkdf.expand(&full_info, &mut okm)?;

    let modulus = 10u64.pow(digits);
    let width = digits as usize;
    let half = |bytes: &[u8]| -> String {
        let mut value = [0u8; 8];
        value.copy_from_slice(bytes);
        format!("{:0width$}", u64::from_be_bytes(value) % modulus)
    };
    let first = half(&okm[0..8]);
    let second = half(&okm[8..16]);
    okm.zeroize();

    Ok(if own_first {
        SasPair {
            own: first,
            contact: second,
        }
    } else {
        SasPair {
            own: second,
            contact: first,
        }
    })
}
