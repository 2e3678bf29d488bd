//! `SimConfig` - Simulation Configuration
//!
//! `TigerStyle`: Seed management for deterministic testing.

use rand::Rng;
use std::env;

use crate::constants::DST_SIMULATION_STEPS_MAX;

/// Environment variable that pins the simulation seed.
pub const DST_SEED_ENV: &str = "DST_SEED";

/// Configuration for a simulation run.
///
/// Immutable after creation. The seed is logged whenever it is generated so
/// a failing run can be replayed.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    seed: u64,
    steps_max: u64,
}

impl SimConfig {
    /// Create config with explicit seed.
    ///
    /// # Example
    /// ```
    /// use forage_core::dst::SimConfig;
    /// let config = SimConfig::with_seed(12345);
    /// assert_eq!(config.seed(), 12345);
    /// ```
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            steps_max: DST_SIMULATION_STEPS_MAX,
        }
    }

    /// Create config from `DST_SEED` or a fresh random seed.
    ///
    /// # Panics
    /// Panics if `DST_SEED` is set but is not a valid u64.
    #[must_use]
    pub fn from_env_or_random() -> Self {
        let seed = match env::var(DST_SEED_ENV) {
            Ok(raw) => raw
                .parse::<u64>()
                .unwrap_or_else(|_| panic!("{DST_SEED_ENV} must be a valid u64, got: {raw}")),
            Err(_) => {
                let seed = rand::thread_rng().gen::<u64>();
                tracing::info!(seed, "DST: generated random seed (replay with DST_SEED={seed})");
                seed
            }
        };

        Self::with_seed(seed)
    }

    /// Get the seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Get the maximum number of steps.
    #[must_use]
    pub fn steps_max(&self) -> u64 {
        self.steps_max
    }

    /// Create a new config with a different `steps_max`.
    ///
    /// # Panics
    /// Panics if `steps_max` is zero.
    #[must_use]
    pub fn with_steps_max(self, steps_max: u64) -> Self {
        assert!(steps_max > 0, "steps_max must be positive");
        Self { steps_max, ..self }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::from_env_or_random()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_seed() {
        let config = SimConfig::with_seed(12345);
        assert_eq!(config.seed(), 12345);
        assert_eq!(config.steps_max(), DST_SIMULATION_STEPS_MAX);
    }

    #[test]
    fn test_with_steps_max() {
        let config = SimConfig::with_seed(42).with_steps_max(100);
        assert_eq!(config.seed(), 42);
        assert_eq!(config.steps_max(), 100);
    }

    #[test]
    #[should_panic(expected = "steps_max must be positive")]
    fn test_with_steps_max_zero_panics() {
        let _ = SimConfig::with_seed(42).with_steps_max(0);
    }
}
