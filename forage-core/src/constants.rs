//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `DST_TIME_ADVANCE_MS_MAX` (not `MAX_TIME_ADVANCE`)

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum number of simulation steps
pub const DST_SIMULATION_STEPS_MAX: u64 = 1_000_000;

/// Default number of operations in a property test run
pub const DST_PROPERTY_OPERATIONS_COUNT_DEFAULT: u64 = 100;

/// Maximum probability for fault injection (1.0 = 100%)
pub const DST_FAULT_PROBABILITY_MAX: f64 = 1.0;

/// Maximum time advance per step in milliseconds
pub const DST_TIME_ADVANCE_MS_MAX: u64 = 86_400_000; // 24 hours

/// Maximum latency for simulated operations in milliseconds
pub const DST_LATENCY_MS_MAX: u64 = 10_000; // 10 seconds

/// Largest byte buffer the deterministic RNG will generate in one call
pub const DST_RANDOM_BYTES_COUNT_MAX: usize = 1_000_000;

// =============================================================================
// Time Constants
// =============================================================================

/// Milliseconds per second
pub const TIME_MS_PER_SEC: u64 = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dst_limits_valid() {
        assert!(DST_PROPERTY_OPERATIONS_COUNT_DEFAULT <= DST_SIMULATION_STEPS_MAX);
        assert!(DST_LATENCY_MS_MAX < DST_TIME_ADVANCE_MS_MAX);
        assert!((DST_FAULT_PROBABILITY_MAX - 1.0).abs() < f64::EPSILON);
    }
}
