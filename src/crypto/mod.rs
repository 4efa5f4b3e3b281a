//! Adapter around the cryptographic primitives the handshakes rely on.
//!
//! The protocols only depend on the call contracts here: KEM encapsulation, commit/open,
//! short authentication strings, randomised signatures and deterministic seed derivation.
mod commitment;
pub use commitment::*;

mod identity_key;
pub use identity_key::*;

mod kem;
pub use kem::*;

mod rng;
pub use rng::Prng;

mod sas;
pub use sas::*;

mod seed;
pub use seed::*;

mod signature;
pub use signature::*;
pub(crate) use signature::{sign, verify_signature};
