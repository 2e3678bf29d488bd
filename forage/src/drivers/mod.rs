//! Built-in Drivers
//!
//! `TigerStyle`: Every backend implements the same two traits from
//! [`crate::driver`]; this module only wires them up.
//!
//! | Driver                | Name                  | Backend                      |
//! |-----------------------|-----------------------|------------------------------|
//! | [`IndexedDriver`]     | `asyncStorage`        | Versioned record databases   |
//! | [`SqlDriver`]         | `webSQLStorage`       | `SQLite` files (`sql` feature) |
//! | [`LocalStorageDriver`]| `localStorageWrapper` | Flat string area with quota  |
//! | [`MemoryDriver`]      | `memoryStorage`       | Process memory (opt-in)      |
//! | [`SimDriver`]         | any                   | Fault-injected, for tests    |

mod indexed;
mod local;
mod memory;
mod sim;
#[cfg(feature = "sql")]
mod sql;

use std::sync::Arc;

pub use indexed::{Connection, ConnectionContexts, DbContext, IndexedDbHost, IndexedDriver, Upgrade};
pub use local::{LocalStorageArea, LocalStorageDriver};
pub use memory::MemoryDriver;
pub use sim::SimDriver;
#[cfg(feature = "sql")]
pub use sql::SqlDriver;

use crate::driver::Driver;

/// Built-in drivers on their process-wide backends, in default preference order.
pub(crate) fn builtin_drivers() -> Vec<Arc<dyn Driver>> {
    let mut drivers: Vec<Arc<dyn Driver>> = vec![Arc::new(IndexedDriver::default())];
    #[cfg(feature = "sql")]
    drivers.push(Arc::new(SqlDriver::from_env()));
    drivers.push(Arc::new(LocalStorageDriver::global()));
    drivers
}
