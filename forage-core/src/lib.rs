//! Forage Core - Simulation Support for Storage Drivers
//!
//! `TigerStyle` deterministic simulation testing inspired by TigerBeetle/FoundationDB.
//!
//! # Philosophy
//!
//! > "If you're not testing with fault injection, you're not testing."
//!
//! Every driver the `forage` façade can select is testable under simulation:
//! 1. Seeds are logged so any failing run can be replayed
//! 2. Driver support, initialisation and storage calls accept injected faults
//! 3. Time is simulated, so slow initialisation is a test input, not a sleep
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                forage-core                   │
//! ├──────────────────────────────────────────────┤
//! │  SimConfig / DeterministicRng │ Replay seeds │
//! │  SimClock                     │ Fake time    │
//! │  FaultInjector                │ Chaos        │
//! │  Simulation / PropertyTest    │ Harnesses    │
//! └──────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod dst;

pub use constants::*;
pub use dst::{
    create_simulation, run_property_tests, test_seeds, DeterministicRng, FaultConfig,
    FaultInjector, FaultInjectorBuilder, FaultType, PropertyTest, PropertyTestFailure,
    PropertyTestResult, PropertyTestable, SimClock, SimConfig, SimEnvironment, Simulation,
};
