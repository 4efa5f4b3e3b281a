use std::sync::Mutex;

use rand_chacha::rand_core::{SeedableRng, TryRngCore};

use crate::Error;

/// Cryptographically-secure random number generator backed by ChaCha20.
#[derive(Debug)]
pub struct Prng {
    rng: Mutex<rand_chacha::ChaCha20Rng>,
}

impl Default for Prng {
    fn default() -> Self {
        Self {
            rng: Mutex::new(rand_chacha::ChaCha20Rng::from_os_rng()),
        }
    }
}

impl Prng {
    /// Builds a deterministic generator. Only meant for tests and simulations.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(rand_chacha::ChaCha20Rng::from_seed(seed)),
        }
    }

    pub fn random_array<const N: usize>(&self) -> Result<[u8; N], Error> {
        let mut rng = self.rng.lock().map_err(|_| Error::Random)?;
        let mut out = [0u8; N];
        rng.try_fill_bytes(&mut out).map_err(|_| Error::Random)?;
        Ok(out)
    }
}
