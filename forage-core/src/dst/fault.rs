//! `FaultInjector` - Probabilistic Fault Injection
//!
//! `TigerStyle`: Explicit fault injection for driver and storage chaos tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::rng::DeterministicRng;
use crate::constants::DST_FAULT_PROBABILITY_MAX;

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    // =========================================================================
    // Driver Lifecycle Faults
    // =========================================================================
    /// Support probe reports the backend as unavailable
    DriverUnsupported,
    /// `init_storage` rejects
    DriverInitFail,
    /// `init_storage` takes a latency spike before settling
    DriverInitLatency,

    // =========================================================================
    // Storage Operation Faults
    // =========================================================================
    /// Read operation fails
    StoreReadFail,
    /// Write operation fails
    StoreWriteFail,
    /// Remove or clear operation fails
    StoreDeleteFail,
    /// Write rejected because the store is full
    StoreQuotaExceeded,
    /// Stored value comes back garbled
    StoreCorruption,

    // =========================================================================
    // Connection Faults
    // =========================================================================
    /// Shared connection closed underneath an operation
    ConnectionClosed,
    /// Upgrade blocked by another open connection
    ConnectionBlocked,
}

impl FaultType {
    /// Get the fault type name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DriverUnsupported => "driver_unsupported",
            Self::DriverInitFail => "driver_init_fail",
            Self::DriverInitLatency => "driver_init_latency",
            Self::StoreReadFail => "store_read_fail",
            Self::StoreWriteFail => "store_write_fail",
            Self::StoreDeleteFail => "store_delete_fail",
            Self::StoreQuotaExceeded => "store_quota_exceeded",
            Self::StoreCorruption => "store_corruption",
            Self::ConnectionClosed => "connection_closed",
            Self::ConnectionBlocked => "connection_blocked",
        }
    }
}

/// Configuration for a specific fault.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// The type of fault
    pub fault_type: FaultType,
    /// Probability of injection (0.0 to 1.0)
    pub probability: f64,
    /// Optional operation filter (substring match)
    pub operation_filter: Option<String>,
    /// Maximum number of injections (None = unlimited)
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Create a new fault configuration.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        assert!(
            (0.0..=DST_FAULT_PROBABILITY_MAX).contains(&probability),
            "probability must be in [0, {DST_FAULT_PROBABILITY_MAX}], got {probability}"
        );

        Self {
            fault_type,
            probability,
            operation_filter: None,
            max_injections: None,
        }
    }

    /// Only inject into operations whose name contains `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    /// Set maximum number of injections.
    ///
    /// # Panics
    /// Panics if `max` is zero.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        assert!(max > 0, "max_injections must be positive");
        self.max_injections = Some(max);
        self
    }

    fn matches(&self, operation: &str) -> bool {
        self.operation_filter
            .as_deref()
            .map_or(true, |filter| operation.contains(filter))
    }
}

/// Fault injector for simulation testing.
///
/// Deterministic through its RNG. Shared via `Arc` once built, so all
/// mutable state lives behind `parking_lot` locks or atomics.
#[derive(Debug)]
pub struct FaultInjector {
    rng: Mutex<DeterministicRng>,
    configs: Vec<FaultConfig>,
    /// Injections per registered config, indexed like `configs`
    injections: Vec<AtomicU64>,
}

impl FaultInjector {
    /// Create a new fault injector with the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            configs: Vec::new(),
            injections: Vec::new(),
        }
    }

    /// Register a fault configuration.
    ///
    /// Registration must happen before sharing via Arc.
    pub fn register(&mut self, config: FaultConfig) {
        assert!(
            (0.0..=DST_FAULT_PROBABILITY_MAX).contains(&config.probability),
            "probability must be in [0, {DST_FAULT_PROBABILITY_MAX}]"
        );
        self.configs.push(config);
        self.injections.push(AtomicU64::new(0));
    }

    /// Check if a fault should be injected for the given operation.
    ///
    /// Configs are consulted in registration order; the first one that
    /// matches and wins its roll is returned.
    pub fn should_inject(&self, operation: &str) -> Option<FaultType> {
        for (config, count) in self.configs.iter().zip(&self.injections) {
            if !config.matches(operation) {
                continue;
            }
            if let Some(max) = config.max_injections {
                if count.load(Ordering::Relaxed) >= max {
                    continue;
                }
            }

            if self.rng.lock().next_bool(config.probability) {
                count.fetch_add(1, Ordering::Relaxed);
                return Some(config.fault_type);
            }
        }

        None
    }

    /// Check whether a specific fault type fires for the given operation.
    ///
    /// Rolls only configs of that type, so probing one concern does not
    /// consume injections meant for another.
    pub fn should_inject_type(&self, fault_type: FaultType, operation: &str) -> bool {
        for (config, count) in self.configs.iter().zip(&self.injections) {
            if config.fault_type != fault_type || !config.matches(operation) {
                continue;
            }
            if let Some(max) = config.max_injections {
                if count.load(Ordering::Relaxed) >= max {
                    continue;
                }
            }
            if self.rng.lock().next_bool(config.probability) {
                count.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    /// Get injection statistics keyed by fault name.
    #[must_use]
    pub fn injection_stats(&self) -> HashMap<String, u64> {
        let mut stats = HashMap::new();
        for (config, count) in self.configs.iter().zip(&self.injections) {
            *stats
                .entry(config.fault_type.as_str().to_string())
                .or_insert(0) += count.load(Ordering::Relaxed);
        }
        stats
    }

    /// Get total number of injections.
    #[must_use]
    pub fn total_injections(&self) -> u64 {
        self.injections
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    /// Reset all statistics.
    pub fn reset_stats(&self) {
        for count in &self.injections {
            count.store(0, Ordering::Relaxed);
        }
    }
}

/// Builder for `FaultInjector`.
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    configs: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    /// Create a new builder with the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            configs: Vec::new(),
        }
    }

    /// Add a fault configuration.
    #[must_use]
    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Add common storage operation faults.
    #[must_use]
    pub fn with_store_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::StoreWriteFail, probability))
            .with_fault(FaultConfig::new(FaultType::StoreReadFail, probability))
    }

    /// Add driver lifecycle faults.
    #[must_use]
    pub fn with_driver_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::DriverInitFail, probability))
    }

    /// Build the `FaultInjector`.
    #[must_use]
    pub fn build(self) -> FaultInjector {
        let mut injector = FaultInjector::new(self.rng);
        for config in self.configs {
            injector.register(config);
        }
        injector
    }
}
