//! DST - Deterministic Simulation Testing
//!
//! TigerBeetle/FoundationDB-style simulation support for storage drivers.
//!
//! # Usage
//!
//! ```rust
//! use forage_core::dst::{FaultConfig, FaultType, SimConfig, Simulation};
//!
//! let env = Simulation::new(SimConfig::with_seed(42))
//!     .with_fault(FaultConfig::new(FaultType::DriverInitFail, 1.0).with_max_injections(1))
//!     .build();
//!
//! assert!(env.faults.should_inject("init_storage").is_some());
//! assert!(env.faults.should_inject("init_storage").is_none());
//! ```
//!
//! Run with explicit seed for reproducibility:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

mod clock;
mod config;
mod fault;
mod property;
mod rng;
mod simulation;

pub use clock::SimClock;
pub use config::{SimConfig, DST_SEED_ENV};
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use property::{
    run_property_tests, test_seeds, PropertyTest, PropertyTestFailure, PropertyTestResult,
    PropertyTestable,
};
pub use rng::DeterministicRng;
pub use simulation::{create_simulation, SimEnvironment, Simulation};
