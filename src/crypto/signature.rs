use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::{Error, Prng};

const SALT_LEN: usize = 32;

/// Length of a salted signature: a 32-byte salt followed by the 64-byte Ed25519 signature.
pub const SIGNATURE_LEN: usize = SALT_LEN + 64;

/// Domain separation for signatures. A signature made under one context never verifies under
/// another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureContext {
    /// Signatures over the device pair of a channel creation ping or ephemeral key.
    ChannelCreation,
}

impl SignatureContext {
    fn label(self) -> &'static [u8] {
        match self {
            Self::ChannelCreation => b"Concord-Sig-ChannelCreation",
        }
    }
}

fn signed_payload(context: SignatureContext, salt: &[u8], fields: &[&[u8]]) -> Vec<u8> {
    let label = context.label();
    let mut payload = Vec::with_capacity(
        label.len() + salt.len() + fields.iter().map(|f| f.len() + 4).sum::<usize>(),
    );
    payload.extend_from_slice(label);
    payload.extend_from_slice(salt);
    for field in fields {
        payload.extend_from_slice(&(field.len() as u32).to_be_bytes());
        payload.extend_from_slice(field);
    }
    payload
}

/// Signs `fields` under `context` with a fresh random salt, so two signatures over the same
/// input are distinct.
pub(crate) fn sign(
    signing_key: &SigningKey,
    context: SignatureContext,
    fields: &[&[u8]],
    prng: &Prng,
) -> Result<Vec<u8>, Error> {
    let salt: [u8; SALT_LEN] = prng.random_array()?;
    let signature = signing_key.sign(&signed_payload(context, &salt, fields));

    let mut out = Vec::with_capacity(SIGNATURE_LEN);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&signature.to_bytes());
    Ok(out)
}

pub(crate) fn verify_signature(
    verifying_key: &VerifyingKey,
    context: SignatureContext,
    fields: &[&[u8]],
    signature: &[u8],
) -> Result<(), Error> {
    if signature.len() != SIGNATURE_LEN {
        return Err(Error::Signature);
    }
    let (salt, raw) = signature.split_at(SALT_LEN);
    let raw = Signature::from_slice(raw)?;
    verifying_key.verify_strict(&signed_payload(context, salt, fields), &raw)?;
    Ok(())
}
