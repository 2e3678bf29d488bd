//! `DeterministicRng` - Seeded Random Number Generator
//!
//! `TigerStyle`: ChaCha20-based RNG so a seed replays a whole run.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::constants::DST_RANDOM_BYTES_COUNT_MAX;

/// Mixing constant for fork seeds (golden ratio, 64-bit).
const FORK_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// A deterministic random number generator.
///
/// Forks derive independent streams, so the fault injector and a test body
/// can each draw numbers without perturbing the other.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha20Rng,
    seed: u64,
    forks: u64,
}

impl DeterministicRng {
    /// Create a new RNG with the given seed.
    ///
    /// # Example
    /// ```
    /// use forage_core::dst::DeterministicRng;
    /// let mut rng = DeterministicRng::new(42);
    /// let value = rng.next_float();
    /// assert!((0.0..1.0).contains(&value));
    /// ```
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
            forks: 0,
        }
    }

    /// Get the original seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate a random float in [0, 1).
    pub fn next_float(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Generate a random u64.
    pub fn next_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Generate a random usize in [min, max] (inclusive).
    ///
    /// # Panics
    /// Panics if min > max.
    pub fn next_usize(&mut self, min: usize, max: usize) -> usize {
        assert!(min <= max, "min ({min}) must be <= max ({max})");
        self.rng.gen_range(min..=max)
    }

    /// Generate a random boolean with the given probability of true.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    pub fn next_bool(&mut self, probability: f64) -> bool {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );
        self.next_float() < probability
    }

    /// Choose a random element from a slice.
    ///
    /// # Panics
    /// Panics if the slice is empty.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        assert!(!items.is_empty(), "cannot choose from empty slice");
        let index = self.next_usize(0, items.len() - 1);
        &items[index]
    }

    /// Generate a lowercase ASCII string of the given length.
    pub fn next_ascii(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| char::from(b'a' + (self.next_usize(0, 25) as u8)))
            .collect()
    }

    /// Generate random bytes.
    ///
    /// # Panics
    /// Panics if `len` exceeds `DST_RANDOM_BYTES_COUNT_MAX`.
    pub fn next_bytes(&mut self, len: usize) -> Vec<u8> {
        assert!(
            len <= DST_RANDOM_BYTES_COUNT_MAX,
            "len must be <= {DST_RANDOM_BYTES_COUNT_MAX}"
        );
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes[..]);
        bytes
    }

    /// Create an independent fork of this RNG.
    pub fn fork(&mut self) -> Self {
        self.forks += 1;
        let fork_seed = self
            .seed
            .wrapping_add(self.forks.wrapping_mul(FORK_SEED_MIX));
        Self::new(fork_seed)
    }
}
