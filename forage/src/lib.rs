//! # Forage
//!
//! One asynchronous key-value API over interchangeable storage drivers.
//!
//! An instance is configured with an ordered list of driver names. The first
//! supported driver that initialises becomes the active driver; every
//! storage call waits until that has happened.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use forage::{ConfigOptions, DriverRegistry, Forage, MemoryDriver};
//!
//! # #[tokio::main]
//! # async fn main() -> forage::ForageResult<()> {
//! let registry = Arc::new(DriverRegistry::new());
//! registry.define_driver(Arc::new(MemoryDriver::new())).await?;
//!
//! let forage = Forage::builder()
//!     .with_registry(registry)
//!     .with_options(ConfigOptions::new().with_driver(["asyncStorage", "memoryStorage"]))
//!     .build()?;
//!
//! forage.set_item("answer", &42).await?;
//! assert_eq!(forage.driver().as_deref(), Some("memoryStorage"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Forage                           │
//! ├─────────────────────────────────────────────────────────┤
//! │  Readiness     │ one gate per instance, cycle per select │
//! │  DriverSelector│ support filter + ordered fallback       │
//! │  DriverRegistry│ shared name → driver, name → supported  │
//! ├─────────────────────────────────────────────────────────┤
//! │  asyncStorage │ webSQLStorage │ localStorageWrapper │ …  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Simulation
//!
//! [`SimDriver`] plugs into `forage_core::dst`: support, initialisation
//! latency and storage faults are all seeded and replayable.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod facade;
pub mod readiness;
pub mod registry;
pub mod selector;
pub mod serializer;
pub mod telemetry;

pub use config::{sanitize_store_name, ConfigOptions, DriverList, StoreConfig};
pub use driver::{Driver, DriverStore, DropOptions, DropTarget, IterateFn, Method, SupportCheck};
pub use drivers::{
    ConnectionContexts, IndexedDbHost, IndexedDriver, LocalStorageArea, LocalStorageDriver,
    MemoryDriver, SimDriver,
};
#[cfg(feature = "sql")]
pub use drivers::SqlDriver;
pub use error::{ForageError, ForageResult, StoreError, StoreResult};
pub use facade::{Forage, ForageBuilder};
pub use readiness::{Readiness, ReadinessState};
pub use registry::DriverRegistry;
pub use selector::{ActiveDriver, DriverSelector, InitOutcome, Selection};
pub use serializer::{JsonSerializer, Serializer};
pub use telemetry::{init_logging, LoggingConfig, TelemetryError};
