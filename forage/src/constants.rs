//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`.

// =============================================================================
// Driver Names
// =============================================================================

/// Indexed record database driver
pub const DRIVER_NAME_INDEXED: &str = "asyncStorage";

/// SQL relational store driver
pub const DRIVER_NAME_SQL: &str = "webSQLStorage";

/// Flat synchronous key-value store driver
pub const DRIVER_NAME_LOCAL: &str = "localStorageWrapper";

/// In-process memory driver (never registered by default)
pub const DRIVER_NAME_MEMORY: &str = "memoryStorage";

/// Names reserved for the built-in drivers, in default preference order
pub const DRIVER_NAMES_RESERVED: [&str; 3] =
    [DRIVER_NAME_INDEXED, DRIVER_NAME_SQL, DRIVER_NAME_LOCAL];

// =============================================================================
// Configuration Defaults
// =============================================================================

/// Default database name
pub const CONFIG_NAME_DEFAULT: &str = "forage";

/// Default store (table / object store) name
pub const CONFIG_STORE_NAME_DEFAULT: &str = "keyvaluepairs";

/// Default schema version
pub const CONFIG_VERSION_DEFAULT: f64 = 1.0;

/// Default size hint in bytes
pub const CONFIG_SIZE_BYTES_DEFAULT: u64 = 4_980_736;

// =============================================================================
// Local Storage Limits
// =============================================================================

/// Byte quota of a flat local storage area
pub const LOCAL_STORAGE_QUOTA_BYTES_DEFAULT: usize = 5 * 1024 * 1024;

/// Key written and removed to probe local storage support
pub const LOCAL_STORAGE_SUPPORT_TEST_KEY: &str = "_forage_support_test";

// =============================================================================
// Environment Variables
// =============================================================================

/// Directory holding SQL driver database files
pub const ENV_SQL_DIR: &str = "FORAGE_SQL_DIR";

/// JSON file the process-wide local storage area persists to
pub const ENV_LOCAL_STORAGE_PATH: &str = "FORAGE_LOCAL_STORAGE_PATH";

/// Log filter directive
pub const ENV_LOG_FILTER: &str = "FORAGE_LOG";

/// Default log filter directive
pub const LOG_FILTER_DEFAULT: &str = "info";
