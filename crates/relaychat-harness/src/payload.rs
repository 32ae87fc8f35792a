//! Seeded message payloads.

use rand::{Rng, SeedableRng, distributions::Alphanumeric};
use rand_chacha::ChaCha8Rng;

/// Alphanumeric payload of `len` bytes, fully determined by `seed`.
pub fn seeded_payload(seed: u64, len: usize) -> Vec<u8> {
    ChaCha8Rng::seed_from_u64(seed).sample_iter(&Alphanumeric).take(len).collect()
}
