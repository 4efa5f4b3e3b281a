//! Key encapsulation over X25519.
//!
//! The ciphertext is a fresh ephemeral public key. The shared key is extracted from the
//! ephemeral-static Diffie-Hellman output, bound to both public keys and to the caller's
//! `info`.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::crypto::Seed;
use crate::{Error, Prng, X25519PublicKey, X25519Secret};

/// Length of an encapsulation.
pub const KEM_CIPHERTEXT_LEN: usize = 32;

/// Generates a KEM key pair. The public half is [`X25519Secret::public_key`].
pub fn generate_kem_key_pair(prng: &Prng) -> Result<X25519Secret, Error> {
    X25519Secret::generate(prng)
}

/// Encapsulates a fresh key to `recipient`.
pub fn encapsulate(
    recipient: &X25519PublicKey,
    info: &[u8],
    prng: &Prng,
) -> Result<(Seed, Vec<u8>), Error> {
    let ephemeral = X25519Secret::generate(prng)?;
    let ciphertext = ephemeral.public_key();
    let shared = ephemeral.dh(recipient);
    if !shared.was_contributory() {
        return Err(Error::Crypto("non-contributory KEM public key".to_string()));
    }

    let key = derive(shared.as_bytes(), &ciphertext, recipient, info)?;
    Ok((key, ciphertext.to_bytes().to_vec()))
}

/// Recovers the key encapsulated in `ciphertext` with the recipient's secret.
pub fn decapsulate(secret: &X25519Secret, ciphertext: &[u8], info: &[u8]) -> Result<Seed, Error> {
    let bytes: [u8; KEM_CIPHERTEXT_LEN] = ciphertext
        .try_into()
        .map_err(|_| Error::Crypto("invalid KEM ciphertext length".to_string()))?;
    let ephemeral = X25519PublicKey::from(bytes);

    let shared = secret.dh(&ephemeral);
    if !shared.was_contributory() {
        return Err(Error::Crypto("non-contributory KEM ciphertext".to_string()));
    }

    derive(shared.as_bytes(), &ephemeral, &secret.public_key(), info)
}

fn derive(
    shared: &[u8; 32],
    ephemeral: &X25519PublicKey,
    recipient: &X25519PublicKey,
    info: &[u8],
) -> Result<Seed, Error> {
    let mut ikm = [0u8; 96];
    ikm[0..32].copy_from_slice(shared);
    ikm[32..64].copy_from_slice(ephemeral.as_bytes());
    ikm[64..96].copy_from_slice(recipient.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(b"Concord-KEM"), &ikm);
    ikm.zeroize();

    let mut okm = [0u8; 32];
    hkdf.expand(info, &mut okm)?;
    let key = Seed::from(okm);
    okm.zeroize();
    Ok(key)
}
